//! In-memory [`VectorIndex`] implementation for testing.
//!
//! Records live in a `HashMap` behind `std::sync::RwLock`, keyed by chunk
//! id so re-ingestion overwrites. Search is brute-force cosine similarity
//! over every stored vector.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::VectorIndex;
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{Error, Result};
use crate::models::{Chunk, EmbeddedChunk, RetrievalResult, ScoredChunk};

const NAME: &str = "memory";

struct StoredRecord {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory vector index for tests and the end-to-end round trip.
pub struct MemoryVectorIndex {
    embedder: Arc<dyn Embedder>,
    records: RwLock<HashMap<String, StoredRecord>>,
    closed: AtomicBool,
}

impl MemoryVectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            records: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::unavailable(NAME, "index has been closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    fn backend(&self) -> &str {
        NAME
    }

    fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.check_open()
    }

    async fn upsert_records(&self, records: &[EmbeddedChunk]) -> Result<()> {
        self.check_open()?;
        let dims = self.embedder.dims();
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dims) {
            return Err(Error::InvalidInput(format!(
                "vector for chunk {} has {} dims, index expects {}",
                bad.chunk.id,
                bad.vector.len(),
                dims
            )));
        }
        let mut stored = self.records.write().unwrap_or_else(|e| e.into_inner());
        for r in records {
            stored.insert(
                r.chunk.id.clone(),
                StoredRecord {
                    chunk: r.chunk.clone(),
                    vector: r.vector.clone(),
                },
            );
        }
        Ok(())
    }

    async fn search_by_vector(&self, vector: &[f32], k: usize) -> Result<RetrievalResult> {
        self.check_open()?;
        let stored = self.records.read().unwrap_or_else(|e| e.into_inner());
        let chunks = stored
            .values()
            .map(|r| ScoredChunk {
                chunk: r.chunk.clone(),
                score: cosine_similarity(vector, &r.vector),
            })
            .collect();
        Ok(RetrievalResult { chunks }.ranked(k))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    /// Maps known words to axis-aligned unit vectors.
    struct Axis;

    #[async_trait]
    impl Embedder for Axis {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| match t.as_str() {
                    "red" => vec![1.0, 0.0, 0.0],
                    "green" => vec![0.0, 1.0, 0.0],
                    _ => vec![0.0, 0.0, 1.0],
                })
                .collect())
        }
    }

    fn record(id: &str, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                id: id.to_string(),
                text: id.to_string(),
                metadata: Metadata::new(),
            },
            vector,
        }
    }

    fn index() -> MemoryVectorIndex {
        MemoryVectorIndex::new(Arc::new(Axis))
    }

    #[tokio::test]
    async fn test_empty_upsert_is_noop() {
        let idx = index();
        idx.upsert(&[]).await.unwrap();
        assert!(idx.is_empty());
    }

    #[tokio::test]
    async fn test_search_ranks_and_bounds() {
        let idx = index();
        idx.upsert(&[
            record("r", vec![1.0, 0.0, 0.0]),
            record("rg", vec![0.7, 0.7, 0.0]),
            record("g", vec![0.0, 1.0, 0.0]),
            record("b", vec![0.0, 0.0, 1.0]),
        ])
        .await
        .unwrap();

        let result = idx.search("red", 2).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.chunks[0].chunk.id, "r");
        assert_eq!(result.chunks[1].chunk.id, "rg");
        assert!(result.chunks[0].score >= result.chunks[1].score);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_id() {
        let idx = index();
        idx.upsert(&[record("a", vec![1.0, 0.0, 0.0])]).await.unwrap();
        idx.upsert(&[record("a", vec![0.0, 1.0, 0.0])]).await.unwrap();
        assert_eq!(idx.len(), 1);
        let top = idx.search("green", 1).await.unwrap();
        assert!((top.chunks[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_zero_k_rejected() {
        let idx = index();
        assert!(matches!(
            idx.search("red", 0).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let idx = index();
        assert!(idx.upsert(&[record("a", vec![1.0])]).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_index_fails_fast() {
        let idx = index();
        idx.close().await.unwrap();
        assert!(matches!(
            idx.search("red", 1).await,
            Err(Error::BackendUnavailable { .. })
        ));
    }
}
