//! Error taxonomy shared by every adapter and pipeline.
//!
//! The variants separate what a caller may retry ([`Error::TransientIo`])
//! from what must stop the process ([`Error::FatalConfig`],
//! [`Error::BackendUnavailable`]). The core never retries on its own.

use std::fmt;

use thiserror::Error;

/// Stage of an ingestion run at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    List,
    Fetch,
    Extract,
    Embed,
    Upsert,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::List => "list",
            IngestStage::Fetch => "fetch",
            IngestStage::Extract => "extract",
            IngestStage::Embed => "embed",
            IngestStage::Upsert => "upsert",
        };
        f.write_str(name)
    }
}

/// Errors produced by docchat adapters and pipelines.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid backend selection, names, or credentials.
    #[error("configuration error: {0}")]
    FatalConfig(String),

    /// A listed key disappeared before it could be fetched.
    #[error("{backend}: key '{key}' not found")]
    NotFound {
        /// The blob store that reported the miss.
        backend: String,
        /// The missing key.
        key: String,
    },

    /// A network or storage fault that a caller may retry.
    #[error("{backend}: transient I/O failure: {message}")]
    TransientIo {
        /// The backend or provider that failed.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A backend client could not be initialized or has been released.
    #[error("{backend} is unavailable: {message}")]
    BackendUnavailable {
        /// The unavailable backend.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// Caller-supplied input was rejected (empty question, unpaired history).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Text could not be extracted from a fetched blob.
    #[error("extraction failed for '{key}': {message}")]
    Extraction {
        /// Key of the blob that failed.
        key: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding or generation service rejected a request.
    #[error("{provider} request failed: {message}")]
    Capability {
        /// The embedding or generation provider.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Wraps any failure during a full ingestion run.
    #[error("ingestion failed during {stage}: {source}")]
    Ingestion {
        /// The stage that failed.
        stage: IngestStage,
        /// The originating cause.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn transient(backend: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::TransientIo {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    pub fn unavailable(backend: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::BackendUnavailable {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    pub fn capability(provider: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Capability {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn during(self, stage: IngestStage) -> Self {
        match self {
            e @ Error::Ingestion { .. } => e,
            e => Error::Ingestion {
                stage,
                source: Box::new(e),
            },
        }
    }

    /// True when a caller may retry the failed operation with backoff.
    ///
    /// For [`Error::Ingestion`] this reflects the wrapped cause.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::TransientIo { .. } => true,
            Error::Ingestion { source, .. } => source.is_retriable(),
            _ => false,
        }
    }

    /// True for conditions that must stop the process at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::FatalConfig(_) | Error::BackendUnavailable { .. }
        )
    }
}

/// A convenience result type for docchat operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retriable() {
        assert!(Error::transient("s3", "connection reset").is_retriable());
        assert!(!Error::FatalConfig("bad".into()).is_retriable());
        assert!(!Error::NotFound {
            backend: "s3".into(),
            key: "a.pdf".into()
        }
        .is_retriable());
        assert!(!Error::capability("openai", "401").is_retriable());
    }

    #[test]
    fn test_ingestion_wraps_once() {
        let err = Error::transient("redis", "timeout")
            .during(IngestStage::Upsert)
            .during(IngestStage::Embed);
        match &err {
            Error::Ingestion { stage, source } => {
                assert_eq!(*stage, IngestStage::Upsert);
                assert!(matches!(**source, Error::TransientIo { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_retriable());
        assert!(err.to_string().contains("during upsert"));
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(Error::FatalConfig("x".into()).is_fatal());
        assert!(Error::unavailable("mongo", "refused").is_fatal());
        assert!(!Error::InvalidInput("x".into()).is_fatal());
    }
}
