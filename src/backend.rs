//! Backend selection.
//!
//! Turns the `backend` / `provider` strings in [`Config`] into concrete
//! adapters behind the core traits. Unknown names and missing sub-tables
//! fail with [`Error::FatalConfig`] before any network call. The vector
//! index is checked with `ensure_ready` once, here, so an unreachable
//! backend stops startup instead of failing the first request.
//!
//! | Setting | Values |
//! |---------|--------|
//! | `storage.backend` | `s3`, `oss` |
//! | `vector.backend` | `pinecone`, `redis`, `mongo`, `chroma` |
//! | `embedding.provider` | `openai`, `ollama` |
//! | `llm.provider` | `openai`, `ollama` |

use std::sync::Arc;

use docchat_core::conversation::Conversation;
use docchat_core::embedding::Embedder;
use docchat_core::generation::ChatModel;
use docchat_core::index::VectorIndex;
use docchat_core::storage::BlobStore;
use docchat_core::{Error, Result};
use tracing::info;

use crate::config::{Config, EmbeddingConfig, LlmConfig, StorageConfig, VectorConfig};
use crate::embedding::{OllamaEmbedder, OpenAIEmbedder};
use crate::index_chroma::ChromaIndex;
use crate::index_mongo::MongoIndex;
use crate::index_pinecone::PineconeIndex;
use crate::index_redis::RedisIndex;
use crate::llm::{OllamaChat, OpenAIChat};
use crate::storage_oss::OssBlobStore;
use crate::storage_s3::S3BlobStore;

const VECTOR_BACKENDS: &str = "\"pinecone\", \"redis\", \"mongo\" or \"chroma\"";

fn missing_table(backend: &str) -> Error {
    Error::FatalConfig(format!(
        "vector.backend = \"{}\" requires a [vector.{}] section",
        backend, backend
    ))
}

/// Build the blob store named by `storage.backend`.
pub fn open_blob_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match config.backend.as_str() {
        "s3" => Arc::new(S3BlobStore::new(config.clone())?),
        "oss" => Arc::new(OssBlobStore::new(config.clone())?),
        other => {
            return Err(Error::FatalConfig(format!(
                "unknown storage backend: {:?} (expected \"s3\" or \"oss\")",
                other
            )))
        }
    };
    info!(backend = store.name(), bucket = %config.bucket, "blob store selected");
    Ok(store)
}

/// Build the vector index named by `vector.backend` and verify it is ready.
pub async fn open_vector_index(
    config: &VectorConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn VectorIndex>> {
    let timeout = config.timeout();
    let index: Arc<dyn VectorIndex> = match config.backend.as_str() {
        "pinecone" => {
            let sub = config.pinecone.clone().ok_or_else(|| missing_table("pinecone"))?;
            Arc::new(PineconeIndex::new(sub, embedder, timeout)?)
        }
        "redis" => {
            let sub = config.redis.as_ref().ok_or_else(|| missing_table("redis"))?;
            Arc::new(RedisIndex::new(sub, embedder, timeout)?)
        }
        "mongo" => {
            let sub = config.mongo.clone().ok_or_else(|| missing_table("mongo"))?;
            Arc::new(MongoIndex::connect(sub, embedder, timeout).await?)
        }
        "chroma" => {
            let sub = config.chroma.as_ref().ok_or_else(|| missing_table("chroma"))?;
            Arc::new(ChromaIndex::new(sub, embedder, timeout)?)
        }
        other => {
            return Err(Error::FatalConfig(format!(
                "unknown vector backend: {:?} (expected {})",
                other,
                VECTOR_BACKENDS
            )))
        }
    };
    index.ensure_ready().await?;
    info!(backend = index.backend(), "vector index ready");
    Ok(index)
}

/// Build the embedding client named by `embedding.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => Err(Error::FatalConfig(format!(
            "unknown embedding provider: {:?}",
            other
        ))),
    }
}

/// Build the chat model named by `llm.provider`.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => Err(Error::FatalConfig(format!("unknown llm provider: {:?}", other))),
    }
}

/// The adapters selected by one configuration.
pub struct Backends {
    pub blobs: Arc<dyn BlobStore>,
    pub index: Arc<dyn VectorIndex>,
    pub model: Arc<dyn ChatModel>,
    k: usize,
}

impl Backends {
    /// Select and open every backend. Capability clients are built first
    /// so that bad names or missing keys fail without touching the network.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let model = create_chat_model(&config.llm)?;
        let blobs = open_blob_store(&config.storage)?;
        let index = open_vector_index(&config.vector, embedder).await?;
        Ok(Self {
            blobs,
            index,
            model,
            k: config.retrieval.k,
        })
    }

    /// A conversation pipeline over the selected index and model.
    pub fn conversation(&self) -> Result<Conversation> {
        Conversation::new(self.index.clone(), self.model.clone()).with_k(self.k)
    }

    /// Close the blob store and the vector index.
    pub async fn release(&self) -> Result<()> {
        docchat_core::ingest::release(self.blobs.as_ref(), self.index.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(backend: &str) -> StorageConfig {
        toml::from_str(&format!("backend = \"{}\"\nbucket = \"docs\"", backend)).unwrap()
    }

    #[test]
    fn test_unknown_storage_backend() {
        let err = open_blob_store(&storage("gcs")).err().unwrap();
        assert!(matches!(err, Error::FatalConfig(ref m) if m.contains("gcs")));
    }

    #[test]
    fn test_unknown_providers() {
        let mut embedding = EmbeddingConfig::default();
        embedding.provider = "cohere".into();
        assert!(create_embedder(&embedding).err().unwrap().is_fatal());

        let mut llm = LlmConfig::default();
        llm.provider = "anthropic".into();
        assert!(create_chat_model(&llm).err().unwrap().is_fatal());
    }
}
