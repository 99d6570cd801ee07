//! Embedding providers.
//!
//! Concrete implementations of the core [`Embedder`] trait:
//! - **[`OpenAIEmbedder`]**: calls the OpenAI embeddings API with retry and backoff.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//!
//! Use [`crate::backend::create_embedder`] to instantiate the provider named
//! by `[embedding] provider`.
//!
//! # Retry Strategy
//!
//! Both providers share [`post_json_with_retry`]:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use async_trait::async_trait;
use docchat_core::embedding::Embedder;
use docchat_core::{Error, Result};
use serde_json::Value;

use crate::config::{env_var, EmbeddingConfig};
use crate::http::{build_client, post_json_with_retry};

const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls the `POST /v1/embeddings` endpoint with the configured model.
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    base_url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FatalConfig`] if `OPENAI_API_KEY` is not set.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = env_var("OPENAI_API_KEY")?;
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_URL.to_string()),
            max_retries: config.max_retries,
            client: build_client("openai", Duration::from_secs(config.timeout_secs))?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_json_with_retry(
            "openai",
            &self.client,
            &format!("{}/v1/embeddings", self.base_url.trim_end_matches('/')),
            Some(&self.api_key),
            &body,
            self.max_retries,
        )
        .await?;
        let vectors = parse_openai_response(&json)?;
        check_dims("openai", &vectors, self.dims)?;
        Ok(vectors)
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays, ordered by their `index` field.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::capability("openai", "invalid response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::capability("openai", "invalid response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, to_f32_vec(embedding)));
    }

    // Sort by index to ensure order matches input
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured Ollama URL (default:
/// `http://localhost:11434`). Requires Ollama to be running with an
/// embedding model pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_URL.to_string()),
            max_retries: config.max_retries,
            client: build_client("ollama", Duration::from_secs(config.timeout_secs))?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_json_with_retry(
            "ollama",
            &self.client,
            &format!("{}/api/embed", self.url.trim_end_matches('/')),
            None,
            &body,
            self.max_retries,
        )
        .await?;
        let vectors = parse_ollama_response(&json)?;
        check_dims("ollama", &vectors, self.dims)?;
        Ok(vectors)
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| Error::capability("ollama", "invalid response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| {
                    Error::capability("ollama", "invalid response: embedding is not an array")
                })
        })
        .collect()
}

fn to_f32_vec(values: &[Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

/// Every vector must match the configured dimensionality.
fn check_dims(provider: &str, vectors: &[Vec<f32>], dims: usize) -> Result<()> {
    match vectors.iter().find(|v| v.len() != dims) {
        Some(v) => Err(Error::FatalConfig(format!(
            "{} returned {}-dimensional embeddings but embedding.dims = {}",
            provider,
            v.len(),
            dims
        ))),
        None => Ok(()),
    }
}
