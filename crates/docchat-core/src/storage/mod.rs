//! Blob storage abstraction.
//!
//! The [`BlobStore`] trait is the contract every object-storage backend
//! implements (S3, Aliyun OSS, the in-memory store used in tests). Backends
//! only need to expose a single page of their native listing; the provided
//! [`BlobStore::list_document_keys`] walks pages until the backend stops
//! returning a next-page cursor.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`list_page`](BlobStore::list_page) | One page of backend-native listing |
//! | [`list_document_keys`](BlobStore::list_document_keys) | Every key, across all pages |
//! | [`fetch`](BlobStore::fetch) | Raw bytes of one blob |
//! | [`close`](BlobStore::close) | Release the client |

pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};

/// One page of a backend listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPage {
    /// Keys in backend enumeration order.
    pub keys: Vec<String>,
    /// Opaque cursor for the next page (continuation token or marker);
    /// `None` once the listing is exhausted.
    pub next: Option<String>,
}

/// Read-only access to a bucket of source documents.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend name used in errors and logs (e.g. `"s3"`).
    fn name(&self) -> &str;

    /// Fetch one page of keys, starting at `cursor` (`None` for the first page).
    async fn list_page(&self, cursor: Option<&str>) -> Result<KeyPage>;

    /// Fetch the raw bytes of one blob.
    ///
    /// Fails with [`Error::NotFound`] if the key vanished since listing and
    /// with [`Error::TransientIo`] for retriable faults.
    async fn fetch(&self, key: &str) -> Result<Vec<u8>>;

    /// Release the underlying client. Later calls fail with
    /// [`Error::BackendUnavailable`].
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Enumerate every key, paging until no cursor is returned.
    ///
    /// Keys come back in enumeration order without duplicates. An empty
    /// bucket yields an empty list. A backend that hands back a cursor it
    /// already returned is reported as a transient fault rather than looped on.
    async fn list_document_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut seen = HashSet::new();
        let mut cursors = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.list_page(cursor.as_deref()).await?;
            pages += 1;
            for key in page.keys {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
            match page.next {
                Some(next) => {
                    if !cursors.insert(next.clone()) {
                        return Err(Error::transient(
                            self.name(),
                            format!("listing cursor '{}' repeated", next),
                        ));
                    }
                    cursor = Some(next);
                }
                None => break,
            }
        }

        debug!(backend = self.name(), pages, keys = keys.len(), "listed bucket");
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serves scripted pages and records every cursor it was called with.
    struct Scripted {
        pages: Vec<KeyPage>,
        calls: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl BlobStore for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn list_page(&self, cursor: Option<&str>) -> Result<KeyPage> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(cursor.map(str::to_string));
            Ok(self.pages[calls.len() - 1].clone())
        }

        async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
            Err(Error::NotFound {
                backend: "scripted".into(),
                key: key.into(),
            })
        }
    }

    fn page(keys: &[&str], next: Option<&str>) -> KeyPage {
        KeyPage {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            next: next.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_follows_cursors_and_dedups() {
        let store = Scripted {
            pages: vec![
                page(&["a", "b"], Some("t1")),
                page(&["b", "c"], Some("t2")),
                page(&["d"], None),
            ],
            calls: Mutex::new(Vec::new()),
        };
        let keys = store.list_document_keys().await.unwrap();
        assert_eq!(keys, vec!["a", "b", "c", "d"]);
        let calls = store.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![None, Some("t1".to_string()), Some("t2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_bucket() {
        let store = Scripted {
            pages: vec![page(&[], None)],
            calls: Mutex::new(Vec::new()),
        };
        assert!(store.list_document_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_cursor_is_transient() {
        let store = Scripted {
            pages: vec![page(&["a"], Some("t")), page(&["b"], Some("t"))],
            calls: Mutex::new(Vec::new()),
        };
        let err = store.list_document_keys().await.unwrap_err();
        assert!(err.is_retriable());
    }
}
