//! Embedding capability trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus pure helper functions for vector serialization and similarity
//! computation.
//!
//! Concrete providers (OpenAI, Ollama) live in the `docchat` app crate.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// An external service turning text into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-ada-002"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::capability(self.model_name(), "empty embedding response"))
    }
}

/// Encode a float vector as little-endian f32 bytes.
///
/// Each `f32` is stored as 4 bytes, producing a blob of `vec.len() × 4`
/// bytes. This is the layout RediSearch expects for `FLOAT32` vector fields.
///
/// # Example
///
/// ```rust
/// use docchat_core::embedding::vec_to_blob;
///
/// let blob = vec_to_blob(&[1.0f32, -2.5, 3.125]);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(&blob[0..4], &1.0f32.to_le_bytes());
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
