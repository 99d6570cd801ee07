//! Redis (RediSearch) vector index.
//!
//! Records are hashes under `key_prefix` with three fields:
//!
//! | Field | Contents |
//! |-------|----------|
//! | `content` | Chunk text |
//! | `metadata` | Chunk metadata as a JSON object |
//! | `content_vector` | Embedding as little-endian `FLOAT32` bytes |
//!
//! `ensure_ready` creates an HNSW / COSINE index over those hashes when
//! `FT.INFO` reports it missing. Search runs a `KNN` query with
//! `DIALECT 2`; RediSearch returns cosine *distance*, reported here as
//! `1 - distance`.
//!
//! # Consistency
//!
//! An upsert is one `MULTI`/`EXEC` pipeline: all records are written or
//! none are.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docchat_core::embedding::{vec_to_blob, Embedder};
use docchat_core::index::VectorIndex;
use docchat_core::models::{Chunk, EmbeddedChunk, Metadata, RetrievalResult, ScoredChunk};
use docchat_core::{Error, Result};
use redis::aio::MultiplexedConnection;
use redis::{RedisError, Value};
use tracing::{debug, info};

use crate::config::RedisConfig;

const NAME: &str = "redis";
const VECTOR_FIELD: &str = "content_vector";

pub struct RedisIndex {
    client: redis::Client,
    index_name: String,
    key_prefix: String,
    timeout: Duration,
    embedder: Arc<dyn Embedder>,
    conn: Mutex<Option<MultiplexedConnection>>,
    closed: AtomicBool,
}

impl RedisIndex {
    pub fn new(
        config: &RedisConfig,
        embedder: Arc<dyn Embedder>,
        timeout: Duration,
    ) -> Result<Self> {
        if config.index_name.trim().is_empty() {
            return Err(Error::FatalConfig(
                "vector.redis.index_name must not be empty".to_string(),
            ));
        }
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| Error::FatalConfig(format!("invalid vector.redis.url: {}", e)))?;
        Ok(Self {
            client,
            index_name: config.index_name.clone(),
            key_prefix: config.key_prefix(),
            timeout,
            embedder,
            conn: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    fn map_err(e: RedisError) -> Error {
        if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() {
            Error::transient(NAME, e)
        } else {
            Error::unavailable(NAME, e)
        }
    }

    /// The shared multiplexed connection, opened on first use.
    async fn connection(&self) -> Result<MultiplexedConnection> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::unavailable(NAME, "index has been closed"));
        }
        let existing = self.lock_conn().clone();
        if let Some(conn) = existing {
            return Ok(conn);
        }

        let connect = self.client.get_multiplexed_async_connection();
        let conn = tokio::time::timeout(self.timeout, connect)
            .await
            .map_err(|_| Error::unavailable(NAME, "timed out connecting"))?
            .map_err(|e| Error::unavailable(NAME, e))?;
        *self.lock_conn() = Some(conn.clone());
        Ok(conn)
    }

    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Option<MultiplexedConnection>> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T> {
        let mut conn = self.connection().await?;
        tokio::time::timeout(self.timeout, cmd.query_async(&mut conn))
            .await
            .map_err(|_| Error::transient(NAME, "command timed out"))?
            .map_err(Self::map_err)
    }

    fn create_index_cmd(&self, dims: usize) -> redis::Cmd {
        let mut cmd = redis::cmd("FT.CREATE");
        cmd.arg(&self.index_name)
            .arg("ON")
            .arg("HASH")
            .arg("PREFIX")
            .arg(1)
            .arg(&self.key_prefix)
            .arg("SCHEMA")
            .arg("content")
            .arg("TEXT")
            .arg("metadata")
            .arg("TEXT")
            .arg(VECTOR_FIELD)
            .arg("VECTOR")
            .arg("HNSW")
            .arg(6)
            .arg("TYPE")
            .arg("FLOAT32")
            .arg("DIM")
            .arg(dims)
            .arg("DISTANCE_METRIC")
            .arg("COSINE");
        cmd
    }

    fn search_cmd(&self, vector: &[f32], k: usize) -> redis::Cmd {
        let mut cmd = redis::cmd("FT.SEARCH");
        cmd.arg(&self.index_name)
            .arg(format!("*=>[KNN {} @{} $vec AS vector_score]", k, VECTOR_FIELD))
            .arg("PARAMS")
            .arg(2)
            .arg("vec")
            .arg(vec_to_blob(vector))
            .arg("RETURN")
            .arg(3)
            .arg("content")
            .arg("metadata")
            .arg("vector_score")
            .arg("SORTBY")
            .arg("vector_score")
            .arg("ASC")
            .arg("LIMIT")
            .arg(0)
            .arg(k)
            .arg("DIALECT")
            .arg(2);
        cmd
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        Value::VerbatimString { text, .. } => Some(text.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Double(d) => Some(d.to_string()),
        _ => None,
    }
}

/// Decode a RESP2 `FT.SEARCH` reply: `[total, key, [field, value, ...], ...]`.
fn parse_search_reply(reply: &Value, key_prefix: &str) -> Result<Vec<ScoredChunk>> {
    let items = match reply {
        Value::Array(items) => items,
        other => {
            return Err(Error::transient(
                NAME,
                format!("unexpected FT.SEARCH reply: {:?}", other),
            ))
        }
    };

    let mut hits = Vec::new();
    for pair in items.get(1..).unwrap_or_default().chunks(2) {
        let [key, Value::Array(fields)] = pair else {
            continue;
        };
        let Some(key) = value_to_string(key) else {
            continue;
        };

        let mut text = String::new();
        let mut metadata = Metadata::new();
        let mut distance = 1.0f32;
        for field in fields.chunks(2) {
            let [name, value] = field else { continue };
            let (Some(name), Some(value)) = (value_to_string(name), value_to_string(value)) else {
                continue;
            };
            match name.as_str() {
                "content" => text = value,
                "metadata" => metadata = serde_json::from_str(&value).unwrap_or_default(),
                "vector_score" => distance = value.parse().unwrap_or(1.0),
                _ => {}
            }
        }

        hits.push(ScoredChunk {
            chunk: Chunk {
                id: key.strip_prefix(key_prefix).unwrap_or(&key).to_string(),
                text,
                metadata,
            },
            score: 1.0 - distance,
        });
    }
    Ok(hits)
}

#[async_trait]
impl VectorIndex for RedisIndex {
    fn backend(&self) -> &str {
        NAME
    }

    fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    async fn ensure_ready(&self) -> Result<()> {
        let pong: String = self.run(&redis::cmd("PING")).await.map_err(|e| match e {
            Error::TransientIo { message, .. } => Error::unavailable(NAME, message),
            other => other,
        })?;
        debug!(reply = %pong, "redis ping");

        let mut info = redis::cmd("FT.INFO");
        info.arg(&self.index_name);
        match self.run::<Value>(&info).await {
            Ok(_) => {
                debug!(index = %self.index_name, "redis index exists");
            }
            Err(Error::BackendUnavailable { message, .. })
                if message.to_lowercase().contains("unknown index")
                    || message.to_lowercase().contains("no such index") =>
            {
                let _: Value = self
                    .run(&self.create_index_cmd(self.embedder.dims()))
                    .await?;
                info!(
                    index = %self.index_name,
                    prefix = %self.key_prefix,
                    dims = self.embedder.dims(),
                    "created redis index"
                );
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn upsert_records(&self, records: &[EmbeddedChunk]) -> Result<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for r in records {
            let metadata = serde_json::to_string(&r.chunk.metadata)
                .map_err(|e| Error::InvalidInput(format!("unserializable metadata: {}", e)))?;
            pipe.cmd("HSET")
                .arg(format!("{}{}", self.key_prefix, r.chunk.id))
                .arg("content")
                .arg(&r.chunk.text)
                .arg("metadata")
                .arg(metadata)
                .arg(VECTOR_FIELD)
                .arg(vec_to_blob(&r.vector))
                .ignore();
        }

        let mut conn = self.connection().await?;
        let _: () = tokio::time::timeout(self.timeout, pipe.query_async(&mut conn))
            .await
            .map_err(|_| Error::transient(NAME, "upsert timed out"))?
            .map_err(Self::map_err)?;
        debug!(records = records.len(), "redis upsert");
        Ok(())
    }

    async fn search_by_vector(&self, vector: &[f32], k: usize) -> Result<RetrievalResult> {
        let reply: Value = self.run(&self.search_cmd(vector, k)).await?;
        Ok(RetrievalResult {
            chunks: parse_search_reply(&reply, &self.key_prefix)?,
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.lock_conn().take();
        Ok(())
    }
}
