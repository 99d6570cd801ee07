//! Chat HTTP endpoint.
//!
//! Serves the conversation pipeline over JSON so a web front end can hold a
//! multi-turn chat against the ingested documents.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Answer `{ question, history }` |
//! | `GET`  | `/health` | Health check (version and vector backend) |
//!
//! Any other method on `/api/chat` is answered with `405 Method Not Allowed`.
//!
//! # Request / Response
//!
//! ```json
//! { "question": "And its population?", "history": ["What is the capital of France?", "Paris."] }
//! ```
//!
//! ```json
//! { "answerText": "About 2.1 million.", "sourceChunks": [{ "id": "…", "text": "…", "metadata": { "source": "facts.pdf" } }] }
//! ```
//!
//! # Errors
//!
//! | Condition | Status | Body |
//! |-----------|--------|------|
//! | Missing or blank `question` | 400 | `{ "message": "No question in the request" }` |
//! | Unpaired `history` | 400 | `{ "error": "…" }` |
//! | Any pipeline failure | 500 | `{ "error": "…" }` |

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use docchat_core::conversation::Conversation;
use docchat_core::models::Answer;
use docchat_core::Error;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::backend::Backends;
use crate::config::Config;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub conversation: Arc<Conversation>,
}

impl AppState {
    pub fn new(conversation: Conversation) -> Self {
        Self {
            conversation: Arc::new(conversation),
        }
    }
}

/// Build the router. Exposed separately from [`run_server`] so tests can
/// mount it on their own listener.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Open the configured backends and serve until the process is stopped.
///
/// Backends are released when the server exits, including on error.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let backends = Backends::open(config)
        .await
        .context("failed to open backends")?;
    let state = AppState::new(backends.conversation()?);

    let served = async {
        let listener = tokio::net::TcpListener::bind(&config.server.bind)
            .await
            .with_context(|| format!("failed to bind {}", config.server.bind))?;
        info!(bind = %config.server.bind, "chat server listening");
        println!("chat server listening on http://{}", config.server.bind);
        axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")
    }
    .await;

    backends.release().await?;
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ============ Error response ============

enum ApiError {
    NoQuestion,
    BadRequest(String),
    Internal(String),
}

#[derive(Serialize)]
struct MessageBody {
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NoQuestion => (
                StatusCode::BAD_REQUEST,
                Json(MessageBody {
                    message: "No question in the request".to_string(),
                }),
            )
                .into_response(),
            ApiError::BadRequest(error) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody { error })).into_response()
            }
            ApiError::Internal(error) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error })).into_response()
            }
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidInput(message) => ApiError::BadRequest(message),
            other => {
                error!(error = %other, "chat request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

// ============ POST /api/chat ============

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    history: Vec<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<Answer>, ApiError> {
    let question = match req.question {
        Some(q) if !q.trim().is_empty() => q,
        _ => return Err(ApiError::NoQuestion),
    };
    let answer = state.conversation.answer(&question, &req.history).await?;
    Ok(Json(answer))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    vector_backend: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        vector_backend: state.conversation.index().backend().to_string(),
    })
}
