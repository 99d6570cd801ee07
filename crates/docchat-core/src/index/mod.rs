//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait hides each backend's native query DSL behind a
//! uniform contract: readiness check, upsert of embedded chunks, and
//! top-k similarity search over query text. Adapters implement the
//! `*_records` / `search_by_vector` primitives; the trait's provided
//! methods enforce the shared rules (empty upserts are no-ops, `k` must be
//! positive, results come back ranked and bounded by `k`).
//!
//! Implementations must be `Send + Sync`: one instance is shared by every
//! concurrent conversation turn.

pub mod memory;

use async_trait::async_trait;
use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::models::{EmbeddedChunk, RetrievalResult};

/// Number of chunks retrieved per question when not configured.
pub const DEFAULT_K: usize = 4;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend name used in errors and logs (e.g. `"pinecone"`).
    fn backend(&self) -> &str;

    /// The embedding capability used to turn query text into a vector.
    fn embedder(&self) -> &dyn Embedder;

    /// Validate connectivity and required names once at startup.
    ///
    /// Unreachable backends fail with [`Error::BackendUnavailable`],
    /// misconfigured ones with [`Error::FatalConfig`].
    async fn ensure_ready(&self) -> Result<()>;

    /// Write a non-empty batch of records.
    async fn upsert_records(&self, records: &[EmbeddedChunk]) -> Result<()>;

    /// Return up to `k` records nearest to `vector`, any order.
    async fn search_by_vector(&self, vector: &[f32], k: usize) -> Result<RetrievalResult>;

    /// Release the client. Later calls fail with [`Error::BackendUnavailable`].
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Write all records. An empty batch is a no-op.
    ///
    /// A reported failure means the whole batch must be retried or
    /// abandoned; callers never assume partial success.
    async fn upsert(&self, records: &[EmbeddedChunk]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        debug!(backend = self.backend(), records = records.len(), "upserting");
        self.upsert_records(records).await
    }

    /// Embed `query` and return the `k` most relevant chunks, best first.
    async fn search(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(Error::InvalidInput("k must be a positive integer".to_string()));
        }
        let vector = self.embedder().embed_query(query).await?;
        let result = self.search_by_vector(&vector, k).await?.ranked(k);
        debug!(backend = self.backend(), k, hits = result.len(), "searched");
        Ok(result)
    }
}
