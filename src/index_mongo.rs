//! MongoDB Atlas Vector Search index.
//!
//! Each chunk is one document in `database.collection`: `_id` is the chunk
//! id, the text lives under `text_key`, the embedding under
//! `embedding_key`, and chunk metadata fields sit flattened at the top
//! level. Search is a `$vectorSearch` aggregation against the Atlas index
//! named `index_name`, which must already exist (Atlas vector indexes are
//! managed outside the driver).
//!
//! # Consistency
//!
//! Upserts are per-record `replace_one` calls with `upsert: true`. They are
//! not atomic across records; a failure part-way leaves earlier records
//! written.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docchat_core::embedding::Embedder;
use docchat_core::index::VectorIndex;
use docchat_core::models::{Chunk, EmbeddedChunk, Metadata, RetrievalResult, ScoredChunk};
use docchat_core::{Error, Result};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use tracing::debug;

use crate::config::MongoConfig;

const NAME: &str = "mongo";
const SCORE_FIELD: &str = "score";

pub struct MongoIndex {
    client: Client,
    collection: Collection<Document>,
    config: MongoConfig,
    embedder: Arc<dyn Embedder>,
    closed: AtomicBool,
}

impl MongoIndex {
    /// Build a client for the configured deployment. No command is sent
    /// until [`VectorIndex::ensure_ready`].
    pub async fn connect(
        config: MongoConfig,
        embedder: Arc<dyn Embedder>,
        timeout: Duration,
    ) -> Result<Self> {
        if config.database.trim().is_empty() || config.collection.trim().is_empty() {
            return Err(Error::FatalConfig(
                "vector.mongo.database and vector.mongo.collection must not be empty".to_string(),
            ));
        }
        let mut options = ClientOptions::parse(&config.url)
            .await
            .map_err(|e| Error::FatalConfig(format!("invalid vector.mongo.url: {}", e)))?;
        options.app_name = Some("docchat".to_string());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(options).map_err(|e| Error::unavailable(NAME, e))?;
        let collection = client
            .database(&config.database)
            .collection::<Document>(&config.collection);

        Ok(Self {
            client,
            collection,
            config,
            embedder,
            closed: AtomicBool::new(false),
        })
    }

    fn map_err(e: mongodb::error::Error) -> Error {
        match *e.kind {
            ErrorKind::Io(_)
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::ConnectionPoolCleared { .. } => Error::transient(NAME, e),
            _ => Error::unavailable(NAME, e),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::unavailable(NAME, "index has been closed"));
        }
        Ok(())
    }

    fn to_document(&self, record: &EmbeddedChunk) -> Result<Document> {
        let mut document = Document::new();
        for (key, value) in &record.chunk.metadata {
            let bson = mongodb::bson::to_bson(value)
                .map_err(|e| Error::InvalidInput(format!("metadata '{}': {}", key, e)))?;
            document.insert(key.clone(), bson);
        }
        document.insert("_id", record.chunk.id.clone());
        document.insert(self.config.text_key.clone(), record.chunk.text.clone());
        document.insert(
            self.config.embedding_key.clone(),
            record
                .vector
                .iter()
                .map(|&x| Bson::Double(x as f64))
                .collect::<Vec<_>>(),
        );
        Ok(document)
    }

    fn search_pipeline(&self, vector: &[f32], k: usize) -> Vec<Document> {
        let query: Vec<Bson> = vector.iter().map(|&x| Bson::Double(x as f64)).collect();
        let num_candidates = (k * self.config.num_candidates_factor.max(1)) as i64;

        let mut project = Document::new();
        project.insert(self.config.embedding_key.clone(), 0);
        project.insert(SCORE_FIELD, doc! { "$meta": "vectorSearchScore" });

        vec![
            doc! {
                "$vectorSearch": {
                    "index": self.config.index_name.as_str(),
                    "path": self.config.embedding_key.as_str(),
                    "queryVector": query,
                    "numCandidates": num_candidates,
                    "limit": k as i64,
                }
            },
            doc! { "$project": project },
        ]
    }
}

/// Rebuild a scored chunk from a `$vectorSearch` result document.
fn from_document(mut document: Document, text_key: &str, embedding_key: &str) -> ScoredChunk {
    let id = match document.remove("_id") {
        Some(Bson::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let text = match document.remove(text_key) {
        Some(Bson::String(s)) => s,
        _ => String::new(),
    };
    let score = match document.remove(SCORE_FIELD) {
        Some(Bson::Double(d)) => d as f32,
        Some(Bson::Int32(i)) => i as f32,
        Some(Bson::Int64(i)) => i as f32,
        _ => 0.0,
    };
    document.remove(embedding_key);

    let metadata: Metadata = document
        .into_iter()
        .map(|(k, v)| (k, v.into_relaxed_extjson()))
        .collect();

    ScoredChunk {
        chunk: Chunk { id, text, metadata },
        score,
    }
}

#[async_trait]
impl VectorIndex for MongoIndex {
    fn backend(&self) -> &str {
        NAME
    }

    fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.check_open()?;
        self.client
            .database(&self.config.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::unavailable(NAME, e))?;
        debug!(
            database = %self.config.database,
            collection = %self.config.collection,
            index = %self.config.index_name,
            "mongo ready"
        );
        Ok(())
    }

    async fn upsert_records(&self, records: &[EmbeddedChunk]) -> Result<()> {
        self.check_open()?;
        for record in records {
            let document = self.to_document(record)?;
            self.collection
                .replace_one(doc! { "_id": record.chunk.id.as_str() }, document)
                .upsert(true)
                .await
                .map_err(Self::map_err)?;
        }
        debug!(records = records.len(), "mongo upsert");
        Ok(())
    }

    async fn search_by_vector(&self, vector: &[f32], k: usize) -> Result<RetrievalResult> {
        self.check_open()?;
        let mut cursor = self
            .collection
            .aggregate(self.search_pipeline(vector, k))
            .await
            .map_err(Self::map_err)?;

        let mut chunks = Vec::new();
        while let Some(document) = cursor.try_next().await.map_err(Self::map_err)? {
            chunks.push(from_document(
                document,
                &self.config.text_key,
                &self.config.embedding_key,
            ));
        }
        Ok(RetrievalResult { chunks })
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.client.clone().shutdown().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_document_flattens_metadata() {
        let document = doc! {
            "_id": "id-1",
            "text": "Paris is the capital.",
            "embedding": [0.1, 0.2],
            "source": "docs/a.pdf",
            "page": 3,
            "score": 0.87,
        };
        let scored = from_document(document, "text", "embedding");
        assert_eq!(scored.chunk.id, "id-1");
        assert_eq!(scored.chunk.text, "Paris is the capital.");
        assert_eq!(scored.chunk.metadata["source"], "docs/a.pdf");
        assert_eq!(scored.chunk.metadata["page"], 3);
        assert!(scored.chunk.metadata.get("embedding").is_none());
        assert!(scored.chunk.metadata.get("score").is_none());
        assert!((scored.score - 0.87).abs() < 1e-6);
    }
}
