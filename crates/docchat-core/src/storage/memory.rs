//! In-memory [`BlobStore`] for tests and local experiments.
//!
//! Keys are kept sorted (like S3 and OSS listings) and served in pages of a
//! configurable size, with the last key of a page as the next marker.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{BlobStore, KeyPage};
use crate::error::{Error, Result};

const NAME: &str = "memory";

/// Sorted in-memory bucket with marker pagination.
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
    page_size: usize,
    closed: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            blobs: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_blob(self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(key, bytes);
        self
    }

    pub fn insert(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        blobs.insert(key.into(), bytes.into());
    }

    /// Remove a blob, simulating a delete racing with ingestion.
    pub fn remove(&self, key: &str) {
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        blobs.remove(key);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::unavailable(NAME, "store has been closed"));
        }
        Ok(())
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_page(&self, cursor: Option<&str>) -> Result<KeyPage> {
        self.check_open()?;
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        let keys: Vec<String> = blobs
            .keys()
            .filter(|k| cursor.map_or(true, |marker| k.as_str() > marker))
            .take(self.page_size + 1)
            .cloned()
            .collect();

        if keys.len() > self.page_size {
            let page: Vec<String> = keys[..self.page_size].to_vec();
            let next = page.last().cloned();
            Ok(KeyPage { keys: page, next })
        } else {
            Ok(KeyPage { keys, next: None })
        }
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        self.check_open()?;
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        blobs.get(key).cloned().ok_or_else(|| Error::NotFound {
            backend: NAME.to_string(),
            key: key.to_string(),
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn filled(n: usize, page_size: usize) -> MemoryBlobStore {
        let store = MemoryBlobStore::new(page_size);
        for i in 0..n {
            store.insert(format!("docs/{:04}.pdf", i), vec![i as u8]);
        }
        store
    }

    #[tokio::test]
    async fn test_fetch_and_missing_key() {
        let store = MemoryBlobStore::default().with_blob("a.pdf", b"bytes".to_vec());
        assert_eq!(store.fetch("a.pdf").await.unwrap(), b"bytes");
        assert!(matches!(
            store.fetch("gone.pdf").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_store_fails_fast() {
        let store = filled(3, 2);
        store.close().await.unwrap();
        assert!(matches!(
            store.list_document_keys().await,
            Err(Error::BackendUnavailable { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn listing_is_complete_regardless_of_page_size(n in 0usize..60, page_size in 1usize..12) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let store = filled(n, page_size);
            let keys = rt.block_on(store.list_document_keys()).unwrap();
            let expected: Vec<String> = (0..n).map(|i| format!("docs/{:04}.pdf", i)).collect();
            prop_assert_eq!(keys, expected);
        }
    }
}
