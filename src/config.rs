//! Configuration parsing and validation.
//!
//! docchat is configured via a TOML file (default: `config/docchat.toml`).
//! The file names backends and tuning knobs only; credentials are read from
//! the environment by the adapter that needs them (see [`env_var`]).
//!
//! # Sections
//!
//! | Section | Purpose |
//! |---------|---------|
//! | `[storage]` | Blob store backend (`s3` or `oss`), bucket, key filters |
//! | `[vector]` | Vector index backend and its `[vector.<backend>]` table |
//! | `[embedding]` | Embedding provider (`openai` or `ollama`) |
//! | `[llm]` | Chat model provider (`openai` or `ollama`) |
//! | `[chunking]` | Window size and overlap, in characters |
//! | `[retrieval]` | Chunks retrieved per question |
//! | `[ingest]` | Fetch concurrency and missing-blob policy |
//! | `[server]` | HTTP bind address |
//!
//! # Example
//!
//! ```toml
//! [storage]
//! backend = "s3"
//! bucket = "my-pdfs"
//! region = "us-east-1"
//!
//! [vector]
//! backend = "chroma"
//!
//! [vector.chroma]
//! collection = "docs"
//! ```
//!
//! Backend names are checked by the selector in [`crate::backend`], which
//! reports unknown values as fatal configuration errors.

use anyhow::{bail, Context, Result};
use docchat_core::ingest::MissingPolicy;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub vector: VectorConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

// ============ Storage ============

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: String,
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Custom endpoint (S3-compatible service, OSS internal endpoint).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}
fn default_page_size() -> usize {
    1000
}

// ============ Vector index ============

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    pub backend: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub pinecone: Option<PineconeConfig>,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub mongo: Option<MongoConfig>,
    #[serde(default)]
    pub chroma: Option<ChromaConfig>,
}

impl VectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PineconeConfig {
    /// Data-plane host of the index, e.g. `https://docs-abc123.svc.us-east-1.pinecone.io`.
    pub index_host: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "default_text_key")]
    pub text_key: String,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    pub index_name: String,
    /// Hash key prefix; defaults to `doc:<index_name>:`.
    #[serde(default)]
    pub key_prefix: Option<String>,
}

impl RedisConfig {
    pub fn key_prefix(&self) -> String {
        self.key_prefix
            .clone()
            .unwrap_or_else(|| format!("doc:{}:", self.index_name))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MongoConfig {
    #[serde(default = "default_mongo_url")]
    pub url: String,
    pub database: String,
    pub collection: String,
    #[serde(default = "default_mongo_index")]
    pub index_name: String,
    #[serde(default = "default_text_key")]
    pub text_key: String,
    #[serde(default = "default_embedding_key")]
    pub embedding_key: String,
    #[serde(default = "default_num_candidates_factor")]
    pub num_candidates_factor: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChromaConfig {
    #[serde(default = "default_chroma_url")]
    pub url: String,
    pub collection: String,
}

fn default_text_key() -> String {
    "text".to_string()
}
fn default_upsert_batch_size() -> usize {
    100
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_mongo_url() -> String {
    "mongodb://localhost:27017".to_string()
}
fn default_mongo_index() -> String {
    "default".to_string()
}
fn default_embedding_key() -> String {
    "embedding".to_string()
}
fn default_num_candidates_factor() -> usize {
    10
}
fn default_chroma_url() -> String {
    "http://localhost:8000".to_string()
}

// ============ Capabilities ============

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL override (Ollama host, OpenAI-compatible proxy).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_llm_model(),
            temperature: 0.0,
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_llm_timeout_secs() -> u64 {
    120
}

// ============ Pipelines ============

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_window_size() -> usize {
    docchat_core::chunk::DEFAULT_WINDOW_SIZE
}
fn default_overlap() -> usize {
    docchat_core::chunk::DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    docchat_core::index::DEFAULT_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_on_missing")]
    pub on_missing: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: default_fetch_concurrency(),
            on_missing: default_on_missing(),
        }
    }
}

impl IngestConfig {
    pub fn missing_policy(&self) -> MissingPolicy {
        match self.on_missing.as_str() {
            "skip" => MissingPolicy::Skip,
            _ => MissingPolicy::Abort,
        }
    }
}

fn default_fetch_concurrency() -> usize {
    4
}
fn default_on_missing() -> String {
    "abort".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

/// Read a required credential from the environment.
pub fn env_var(name: &str) -> docchat_core::Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(docchat_core::Error::FatalConfig(format!(
            "{} environment variable not set",
            name
        ))),
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate storage
    if config.storage.bucket.trim().is_empty() {
        bail!("storage.bucket must not be empty");
    }
    if config.storage.page_size == 0 || config.storage.page_size > 1000 {
        bail!("storage.page_size must be in [1, 1000]");
    }

    // Validate chunking
    if config.chunking.window_size == 0 {
        bail!("chunking.window_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.window_size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.window_size ({})",
            config.chunking.overlap,
            config.chunking.window_size
        );
    }

    // Validate retrieval
    if config.retrieval.k < 1 {
        bail!("retrieval.k must be >= 1");
    }

    // Validate embedding
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Validate ingest
    if config.ingest.fetch_concurrency == 0 {
        bail!("ingest.fetch_concurrency must be >= 1");
    }
    match config.ingest.on_missing.as_str() {
        "abort" | "skip" => {}
        other => bail!(
            "Unknown ingest.on_missing policy: '{}'. Must be abort or skip.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[storage]
backend = "s3"
bucket = "pdfs"

[vector]
backend = "redis"

[vector.redis]
index_name = "docs"
"#;

    fn parse(extra: &str) -> Result<Config> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("docchat.toml");
        std::fs::write(&path, format!("{}\n{}", MINIMAL, extra))?;
        load_config(&path)
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse("").unwrap();
        assert_eq!(config.storage.include_globs, vec!["**/*.pdf"]);
        assert_eq!(config.storage.page_size, 1000);
        assert_eq!(config.chunking.window_size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.k, 4);
        assert_eq!(config.embedding.model, "text-embedding-ada-002");
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.ingest.missing_policy(), MissingPolicy::Abort);
        assert_eq!(config.server.bind, "127.0.0.1:3000");

        let redis = config.vector.redis.unwrap();
        assert_eq!(redis.url, "redis://127.0.0.1:6379");
        assert_eq!(redis.key_prefix(), "doc:docs:");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let err = parse("[chunking]\nwindow_size = 100\noverlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunking.overlap"));
    }

    #[test]
    fn test_zero_k_rejected() {
        assert!(parse("[retrieval]\nk = 0\n").is_err());
    }

    #[test]
    fn test_unknown_missing_policy_rejected() {
        assert!(parse("[ingest]\non_missing = \"retry\"\n").is_err());
        let config = parse("[ingest]\non_missing = \"skip\"\n").unwrap();
        assert_eq!(config.ingest.missing_policy(), MissingPolicy::Skip);
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = load_config(Path::new("/nonexistent/docchat.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
