//! Chroma vector index over the `/api/v1` REST API.
//!
//! `ensure_ready` checks the server heartbeat, then gets or creates the
//! configured collection with `hnsw:space = cosine` and caches its id.
//! Chroma reports cosine *distance*; scores are returned as `1 - distance`.
//!
//! # Consistency
//!
//! One upsert is one `/upsert` request, which Chroma applies as a unit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docchat_core::embedding::Embedder;
use docchat_core::index::VectorIndex;
use docchat_core::models::{Chunk, EmbeddedChunk, Metadata, RetrievalResult, ScoredChunk};
use docchat_core::{Error, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ChromaConfig;
use crate::http::{build_client, read_json, transport_error};

const NAME: &str = "chroma";

pub struct ChromaIndex {
    base_url: String,
    collection: String,
    client: reqwest::Client,
    embedder: Arc<dyn Embedder>,
    collection_id: Mutex<Option<String>>,
    closed: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
}

/// Chroma answers queries column-wise, one inner list per query vector.
#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
}

impl ChromaIndex {
    pub fn new(
        config: &ChromaConfig,
        embedder: Arc<dyn Embedder>,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        if config.collection.trim().is_empty() {
            return Err(Error::FatalConfig(
                "vector.chroma.collection must not be empty".to_string(),
            ));
        }
        Ok(Self {
            base_url: format!("{}/api/v1", config.url.trim_end_matches('/')),
            collection: config.collection.clone(),
            client: build_client(NAME, timeout)?,
            embedder,
            collection_id: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::unavailable(NAME, "index has been closed"));
        }
        Ok(())
    }

    fn cached_id(&self) -> Option<String> {
        self.collection_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The collection id resolved by `ensure_ready`.
    fn id(&self) -> Result<String> {
        self.check_open()?;
        self.cached_id().ok_or_else(|| {
            Error::unavailable(NAME, "collection not resolved; call ensure_ready first")
        })
    }

    async fn post<T: serde::de::DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(NAME, e))?;
        read_json(NAME, resp).await
    }
}

fn upsert_body(records: &[EmbeddedChunk]) -> Value {
    let ids: Vec<&str> = records.iter().map(|r| r.chunk.id.as_str()).collect();
    let embeddings: Vec<&[f32]> = records.iter().map(|r| r.vector.as_slice()).collect();
    let documents: Vec<&str> = records.iter().map(|r| r.chunk.text.as_str()).collect();
    // Chroma rejects null and nested metadata values.
    let metadatas: Vec<Metadata> = records
        .iter()
        .map(|r| {
            r.chunk
                .metadata
                .iter()
                .filter_map(|(k, v)| match v {
                    Value::Null => None,
                    Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                        Some((k.clone(), v.clone()))
                    }
                    other => Some((k.clone(), Value::String(other.to_string()))),
                })
                .collect()
        })
        .collect();
    json!({
        "ids": ids,
        "embeddings": embeddings,
        "documents": documents,
        "metadatas": metadatas,
    })
}

fn parse_query(resp: QueryResponse) -> Vec<ScoredChunk> {
    let ids = resp.ids.into_iter().next().unwrap_or_default();
    let mut documents = resp
        .documents
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default()
        .into_iter();
    let mut metadatas = resp
        .metadatas
        .and_then(|m| m.into_iter().next())
        .unwrap_or_default()
        .into_iter();
    let mut distances = resp
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default()
        .into_iter();

    ids.into_iter()
        .map(|id| {
            let text = documents.next().flatten().unwrap_or_default();
            let metadata = metadatas.next().flatten().unwrap_or_default();
            let distance = distances.next().unwrap_or(1.0);
            ScoredChunk {
                chunk: Chunk { id, text, metadata },
                score: 1.0 - distance,
            }
        })
        .collect()
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    fn backend(&self) -> &str {
        NAME
    }

    fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.check_open()?;
        let resp = self
            .client
            .get(format!("{}/heartbeat", self.base_url))
            .send()
            .await
            .map_err(|e| Error::unavailable(NAME, e))?;
        let _: Value = read_json(NAME, resp).await.map_err(|e| match e {
            Error::TransientIo { message, .. } => Error::unavailable(NAME, message),
            other => other,
        })?;

        if self.cached_id().is_some() {
            return Ok(());
        }
        let info: CollectionInfo = self
            .post(
                "/collections",
                &json!({
                    "name": self.collection,
                    "metadata": {"hnsw:space": "cosine"},
                    "get_or_create": true,
                }),
            )
            .await?;
        debug!(collection = %self.collection, id = %info.id, "chroma collection ready");
        *self.collection_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(info.id);
        Ok(())
    }

    async fn upsert_records(&self, records: &[EmbeddedChunk]) -> Result<()> {
        let id = self.id()?;
        let _: Value = self
            .post(&format!("/collections/{}/upsert", id), &upsert_body(records))
            .await?;
        debug!(records = records.len(), "chroma upsert");
        Ok(())
    }

    async fn search_by_vector(&self, vector: &[f32], k: usize) -> Result<RetrievalResult> {
        let id = self.id()?;
        let body = json!({
            "query_embeddings": [vector],
            "n_results": k,
            "include": ["documents", "metadatas", "distances"],
        });
        let resp: QueryResponse = self
            .post(&format!("/collections/{}/query", id), &body)
            .await?;
        Ok(RetrievalResult {
            chunks: parse_query(resp),
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
