//! Pinecone vector index.
//!
//! Talks to the index's data-plane host over REST. Records are stored with
//! the chunk text under `text_key` and the chunk metadata flattened beside
//! it, in the configured namespace.
//!
//! # Configuration
//!
//! ```toml
//! [vector]
//! backend = "pinecone"
//!
//! [vector.pinecone]
//! index_host = "https://docs-abc123.svc.us-east-1-aws.pinecone.io"
//! namespace = "handbook"
//! ```
//!
//! Requires `PINECONE_API_KEY`.
//!
//! # Consistency
//!
//! Upserts are sent in batches of `upsert_batch_size`. Each batch is
//! atomic; a failure part-way leaves earlier batches written.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use docchat_core::embedding::Embedder;
use docchat_core::index::VectorIndex;
use docchat_core::models::{Chunk, EmbeddedChunk, Metadata, RetrievalResult, ScoredChunk};
use docchat_core::{Error, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{env_var, PineconeConfig};
use crate::http::{build_client, read_json, transport_error};

const NAME: &str = "pinecone";
const API_VERSION: &str = "2024-07";

pub struct PineconeIndex {
    config: PineconeConfig,
    api_key: String,
    client: reqwest::Client,
    embedder: Arc<dyn Embedder>,
    closed: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct IndexStats {
    dimension: usize,
    #[serde(default, rename = "totalVectorCount")]
    total_vector_count: u64,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Metadata>,
}

impl PineconeIndex {
    pub fn new(
        config: PineconeConfig,
        embedder: Arc<dyn Embedder>,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        if config.index_host.trim().is_empty() {
            return Err(Error::FatalConfig(
                "vector.pinecone.index_host must not be empty".to_string(),
            ));
        }
        if config.upsert_batch_size == 0 {
            return Err(Error::FatalConfig(
                "vector.pinecone.upsert_batch_size must be > 0".to_string(),
            ));
        }
        Ok(Self {
            api_key: env_var("PINECONE_API_KEY")?,
            client: build_client(NAME, timeout)?,
            config,
            embedder,
            closed: AtomicBool::new(false),
        })
    }

    fn url(&self, path: &str) -> String {
        let host = self.config.index_host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}{}", host, path)
        } else {
            format!("https://{}{}", host, path)
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::unavailable(NAME, "index has been closed"));
        }
        Ok(())
    }

    async fn post<T: serde::de::DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let resp = self
            .client
            .post(self.url(path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(NAME, e))?;
        read_json(NAME, resp).await
    }
}

/// Pinecone record for one chunk: text and metadata share the metadata map.
fn to_record(record: &EmbeddedChunk, text_key: &str) -> Value {
    let mut metadata: Metadata = record
        .chunk
        .metadata
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    metadata.insert(text_key.to_string(), Value::String(record.chunk.text.clone()));
    json!({
        "id": record.chunk.id,
        "values": record.vector,
        "metadata": metadata,
    })
}

fn from_match(m: QueryMatch, text_key: &str) -> ScoredChunk {
    let mut metadata = m.metadata.unwrap_or_default();
    let text = match metadata.remove(text_key) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };
    ScoredChunk {
        chunk: Chunk {
            id: m.id,
            text,
            metadata,
        },
        score: m.score,
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn backend(&self) -> &str {
        NAME
    }

    fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.check_open()?;
        let stats: IndexStats = self
            .post("/describe_index_stats", &json!({}))
            .await
            .map_err(|e| match e {
                Error::TransientIo { message, .. } => Error::unavailable(NAME, message),
                other => other,
            })?;
        if stats.dimension != self.embedder.dims() {
            return Err(Error::FatalConfig(format!(
                "pinecone index dimension {} does not match embedding.dims {}",
                stats.dimension,
                self.embedder.dims()
            )));
        }
        debug!(
            dimension = stats.dimension,
            vectors = stats.total_vector_count,
            namespace = %self.config.namespace,
            "pinecone index ready"
        );
        Ok(())
    }

    async fn upsert_records(&self, records: &[EmbeddedChunk]) -> Result<()> {
        self.check_open()?;
        for batch in records.chunks(self.config.upsert_batch_size) {
            let vectors: Vec<Value> = batch
                .iter()
                .map(|r| to_record(r, &self.config.text_key))
                .collect();
            let body = json!({
                "vectors": vectors,
                "namespace": self.config.namespace,
            });
            let _: Value = self.post("/vectors/upsert", &body).await?;
            debug!(records = batch.len(), "pinecone upsert batch");
        }
        Ok(())
    }

    async fn search_by_vector(&self, vector: &[f32], k: usize) -> Result<RetrievalResult> {
        self.check_open()?;
        let body = json!({
            "vector": vector,
            "topK": k,
            "includeMetadata": true,
            "includeValues": false,
            "namespace": self.config.namespace,
        });
        let resp: QueryResponse = self.post("/query", &body).await?;
        Ok(RetrievalResult {
            chunks: resp
                .matches
                .into_iter()
                .map(|m| from_match(m, &self.config.text_key))
                .collect(),
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
