//! Chat model providers.
//!
//! Concrete implementations of the core [`ChatModel`] trait. Each prompt is
//! sent as a single user message; the reply text is returned as is.
//!
//! | Provider | Endpoint |
//! |----------|----------|
//! | [`OpenAIChat`] | `POST /v1/chat/completions` |
//! | [`OllamaChat`] | `POST /api/chat` with `stream: false` |
//!
//! Both use the same retry policy as the embedding providers.

use std::time::Duration;

use async_trait::async_trait;
use docchat_core::generation::ChatModel;
use docchat_core::{Error, Result};
use serde_json::Value;

use crate::config::{env_var, LlmConfig};
use crate::http::{build_client, post_json_with_retry};

pub struct OpenAIChat {
    model: String,
    temperature: f32,
    api_key: String,
    base_url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            api_key: env_var("OPENAI_API_KEY")?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            max_retries: config.max_retries,
            client: build_client("openai", Duration::from_secs(config.timeout_secs))?,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });
        let json = post_json_with_retry(
            "openai",
            &self.client,
            &format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/')),
            Some(&self.api_key),
            &body,
            self.max_retries,
        )
        .await?;
        parse_openai_reply(&json)
    }
}

fn parse_openai_reply(json: &Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::capability(
                "openai",
                "invalid response: missing choices[0].message.content",
            )
        })
}

pub struct OllamaChat {
    model: String,
    temperature: f32,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            max_retries: config.max_retries,
            client: build_client("ollama", Duration::from_secs(config.timeout_secs))?,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "options": {"temperature": self.temperature},
            "messages": [{"role": "user", "content": prompt}],
        });
        let json = post_json_with_retry(
            "ollama",
            &self.client,
            &format!("{}/api/chat", self.url.trim_end_matches('/')),
            None,
            &body,
            self.max_retries,
        )
        .await?;
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::capability("ollama", "invalid response: missing message.content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_reply() {
        let json = serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Paris."}}]
        });
        assert_eq!(parse_openai_reply(&json).unwrap(), "Paris.");
        assert!(parse_openai_reply(&serde_json::json!({"choices": []})).is_err());
    }
}
