//! Shared HTTP plumbing for the REST-based adapters.
//!
//! Maps transport failures and non-success statuses onto the core error
//! taxonomy so every adapter reports the same kinds for the same faults:
//!
//! | Condition | Error |
//! |-----------|-------|
//! | Connect / timeout / body read failure | `TransientIo` |
//! | 429, 5xx | `TransientIo` |
//! | 404 on a keyed resource | `NotFound` |
//! | 401, 403 | `BackendUnavailable` |
//! | Other 4xx | `BackendUnavailable` |

use std::time::Duration;

use docchat_core::Error;
use reqwest::StatusCode;
use tracing::{debug, warn};

/// Build a client with a per-request timeout.
pub fn build_client(backend: &str, timeout: Duration) -> docchat_core::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::unavailable(backend, format!("failed to build HTTP client: {}", e)))
}

/// Classify a failed send or body read.
pub fn transport_error(backend: &str, e: reqwest::Error) -> Error {
    Error::transient(backend, e)
}

/// Classify a non-success response. `key` names the resource for 404s.
pub fn status_error(backend: &str, status: StatusCode, body: &str, key: Option<&str>) -> Error {
    let snippet: String = body.chars().take(500).collect();
    match (status, key) {
        (StatusCode::NOT_FOUND, Some(key)) => Error::NotFound {
            backend: backend.to_string(),
            key: key.to_string(),
        },
        (s, _) if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => {
            Error::transient(backend, format!("HTTP {}: {}", s, snippet))
        }
        (s, _) => Error::unavailable(backend, format!("HTTP {}: {}", s, snippet)),
    }
}

/// Read the body of a response, mapping non-success statuses.
pub async fn read_text(
    backend: &str,
    resp: reqwest::Response,
    key: Option<&str>,
) -> docchat_core::Result<String> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| transport_error(backend, e))?;
    if !status.is_success() {
        return Err(status_error(backend, status, &body, key));
    }
    Ok(body)
}

/// Decode a JSON body, mapping non-success statuses.
pub async fn read_json<T: serde::de::DeserializeOwned>(
    backend: &str,
    resp: reqwest::Response,
) -> docchat_core::Result<T> {
    let body = read_text(backend, resp, None).await?;
    serde_json::from_str(&body)
        .map_err(|e| Error::transient(backend, format!("unexpected response body: {}", e)))
}

/// POST a JSON body to a model API with retry/backoff, returning the JSON reply.
///
/// Retry strategy:
/// - HTTP 429 or 5xx → retry with exponential backoff (1s, 2s, 4s, ... capped at 32s)
/// - HTTP 4xx (not 429) → fail immediately with `Capability`
/// - Network error → retry
///
/// Exhausted retries surface as `TransientIo` so callers may try again later.
pub async fn post_json_with_retry(
    provider: &str,
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
) -> docchat_core::Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(provider, attempt, delay_secs = delay.as_secs(), "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();

                if status.is_success() {
                    return serde_json::from_str(&text).map_err(|e| {
                        Error::capability(provider, format!("invalid JSON response: {}", e))
                    });
                }

                // Rate limited or server error: retry
                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    warn!(provider, %status, "transient API error");
                    last_err = Some(status_error(provider, status, &text, None));
                    continue;
                }

                // Client error (not 429): fail now
                let snippet: String = text.chars().take(500).collect();
                return Err(Error::capability(
                    provider,
                    format!("API error {}: {}", status, snippet),
                ));
            }
            Err(e) => {
                warn!(provider, error = %e, "request failed");
                last_err = Some(transport_error(provider, e));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::transient(provider, "request failed after retries")))
}
