//! Amazon S3 blob store.
//!
//! Lists and downloads objects from an S3 bucket using the S3 REST API with
//! AWS Signature V4 authentication. Supports custom endpoints for
//! S3-compatible services (MinIO, LocalStack).
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! backend = "s3"
//! bucket = "acme-docs"
//! prefix = "handbooks/"
//! region = "us-east-1"
//! include_globs = ["**/*.pdf"]
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional (for temporary credentials / IAM roles)
//!
//! # Pagination
//!
//! `ListObjectsV2` pages of up to `page_size` keys; the
//! `NextContinuationToken` is the cursor handed back to the core listing
//! loop.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use docchat_core::storage::{BlobStore, KeyPage};
use docchat_core::{Error, Result};
use tracing::debug;

use crate::config::StorageConfig;
use crate::http::{build_client, read_text, status_error, transport_error};
use crate::listing::{parse_listing, KeyFilter};
use crate::signing::{encode_key_path, sign_s3_get, Credentials, RequestParts};

const NAME: &str = "s3";

pub struct S3BlobStore {
    config: StorageConfig,
    creds: Credentials,
    client: reqwest::Client,
    filter: KeyFilter,
    closed: AtomicBool,
}

impl S3BlobStore {
    /// Create a store for the configured bucket, reading credentials from
    /// the environment.
    pub fn new(config: StorageConfig) -> Result<Self> {
        let creds = Credentials::aws_from_env()?;
        Self::with_credentials(config, creds)
    }

    pub fn with_credentials(config: StorageConfig, creds: Credentials) -> Result<Self> {
        let client = build_client(
            NAME,
            std::time::Duration::from_secs(config.timeout_secs),
        )?;
        let filter = KeyFilter::new(
            &config.prefix,
            &config.include_globs,
            &config.exclude_globs,
        )?;
        Ok(Self {
            config,
            creds,
            client,
            filter,
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::unavailable(NAME, "store has been closed"));
        }
        Ok(())
    }

    /// `(scheme, host)` for the bucket.
    ///
    /// A custom `endpoint_url` (MinIO, LocalStack) is addressed path-style,
    /// so the bucket moves into the path; see [`Self::bucket_path`].
    fn endpoint(&self) -> (&str, String) {
        match self.config.endpoint_url {
            Some(ref endpoint) => {
                let scheme = if endpoint.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                (scheme, host)
            }
            None => (
                "https",
                format!(
                    "{}.s3.{}.amazonaws.com",
                    self.config.bucket, self.config.region
                ),
            ),
        }
    }

    fn bucket_path(&self, encoded_key: &str) -> String {
        if self.config.endpoint_url.is_some() {
            format!("/{}/{}", self.config.bucket, encoded_key)
        } else {
            format!("/{}", encoded_key)
        }
    }

    async fn signed_get(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<reqwest::Response> {
        let (scheme, host) = self.endpoint();
        let req = RequestParts {
            host: &host,
            path,
            query,
        };
        let headers = sign_s3_get(&self.creds, &self.config.region, &req, Utc::now());

        let query_string = crate::signing::canonical_query(query);
        let url = if query_string.is_empty() {
            format!("{}://{}{}", scheme, host, path)
        } else {
            format!("{}://{}{}?{}", scheme, host, path, query_string)
        };

        let mut builder = self.client.get(&url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.send().await.map_err(|e| transport_error(NAME, e))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_page(&self, cursor: Option<&str>) -> Result<KeyPage> {
        self.check_open()?;

        let mut query = vec![
            ("list-type".to_string(), "2".to_string()),
            ("max-keys".to_string(), self.config.page_size.to_string()),
        ];
        if !self.config.prefix.is_empty() {
            query.push(("prefix".to_string(), self.config.prefix.clone()));
        }
        if let Some(token) = cursor {
            query.push(("continuation-token".to_string(), token.to_string()));
        }

        let resp = self.signed_get(&self.bucket_path(""), &query).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::FatalConfig(format!(
                "S3 bucket '{}' does not exist",
                self.config.bucket
            )));
        }
        let xml = read_text(NAME, resp, None).await?;
        let listing = parse_listing(NAME, &xml)?;

        let listed = listing.keys.len();
        let keys: Vec<String> = listing
            .keys
            .into_iter()
            .filter(|k| self.filter.matches(k))
            .collect();
        debug!(bucket = %self.config.bucket, listed, kept = keys.len(), "s3 list page");

        let next = if listing.is_truncated {
            match listing.next_continuation_token {
                Some(token) => Some(token),
                None => {
                    return Err(Error::transient(
                        NAME,
                        "truncated listing without NextContinuationToken",
                    ))
                }
            }
        } else {
            None
        };
        Ok(KeyPage { keys, next })
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        self.check_open()?;
        let resp = self
            .signed_get(&self.bucket_path(&encode_key_path(key)), &[])
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(NAME, status, &body, Some(key)));
        }
        let bytes = resp.bytes().await.map_err(|e| transport_error(NAME, e))?;
        debug!(key, bytes = bytes.len(), "s3 get object");
        Ok(bytes.to_vec())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: Option<&str>) -> StorageConfig {
        StorageConfig {
            backend: "s3".into(),
            bucket: "pdfs".into(),
            region: "eu-west-1".into(),
            prefix: String::new(),
            include_globs: vec!["**/*.pdf".into()],
            exclude_globs: vec![],
            endpoint_url: endpoint.map(str::to_string),
            page_size: 1000,
            timeout_secs: 5,
        }
    }

    fn creds() -> Credentials {
        Credentials {
            access_key_id: "id".into(),
            secret_access_key: "secret".into(),
            session_token: None,
        }
    }

    #[test]
    fn test_virtual_hosted_addressing() {
        let store = S3BlobStore::with_credentials(config(None), creds()).unwrap();
        let (scheme, host) = store.endpoint();
        assert_eq!(scheme, "https");
        assert_eq!(host, "pdfs.s3.eu-west-1.amazonaws.com");
        assert_eq!(store.bucket_path("a.pdf"), "/a.pdf");
    }

    #[test]
    fn test_custom_endpoint_is_path_style() {
        let store =
            S3BlobStore::with_credentials(config(Some("http://localhost:9000/")), creds()).unwrap();
        let (scheme, host) = store.endpoint();
        assert_eq!(scheme, "http");
        assert_eq!(host, "localhost:9000");
        assert_eq!(store.bucket_path("a.pdf"), "/pdfs/a.pdf");
    }

    #[tokio::test]
    async fn test_closed_store_fails_without_network() {
        let store = S3BlobStore::with_credentials(config(None), creds()).unwrap();
        store.close().await.unwrap();
        assert!(matches!(
            store.fetch("a.pdf").await,
            Err(Error::BackendUnavailable { .. })
        ));
    }
}
