//! # docchat
//!
//! Retrieval-augmented chat over documents kept in object storage.
//!
//! Documents are listed and fetched from an S3 or Aliyun OSS bucket,
//! split into overlapping chunks, embedded, and written to one of several
//! vector databases. A conversation turn condenses the chat history into a
//! standalone question, retrieves the nearest chunks, and asks a language
//! model to answer from them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ Blob store  │──▶│ Ingest pipeline  │──▶│  Vector index    │
//! │  S3 / OSS   │   │ Extract+Chunk+Emb│   │ Pinecone/Redis/  │
//! └─────────────┘   └──────────────────┘   │ Mongo/Chroma     │
//!                                          └────────┬─────────┘
//!                      ┌────────────────────────────┤
//!                      ▼                            ▼
//!                 ┌──────────┐               ┌────────────┐
//!                 │   CLI    │               │ HTTP chat  │
//!                 │(docchat) │               │ /api/chat  │
//!                 └──────────┘               └────────────┘
//! ```
//!
//! The backend-neutral pieces (data model, error taxonomy, chunker, the
//! pipelines, and the in-memory adapters) live in `docchat-core`. This
//! crate adds the networked adapters, configuration, and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`backend`] | Backend selection from configuration |
//! | [`storage_s3`] | Amazon S3 (and S3-compatible) blob store |
//! | [`storage_oss`] | Aliyun OSS blob store |
//! | [`signing`] | SigV4 / OSS V4 request signing |
//! | [`listing`] | Bucket listing XML parsing and key filtering |
//! | [`index_pinecone`] | Pinecone vector index |
//! | [`index_redis`] | Redis (RediSearch) vector index |
//! | [`index_mongo`] | MongoDB Atlas vector index |
//! | [`index_chroma`] | Chroma vector index |
//! | [`embedding`] | OpenAI / Ollama embedding clients |
//! | [`llm`] | OpenAI / Ollama chat clients |
//! | [`extract`] | PDF and plain-text extraction |
//! | [`ingest`] | `docchat ingest` command |
//! | [`ask`] | `docchat ask` / `docchat check` commands |
//! | [`server`] | Chat HTTP endpoint |

pub mod ask;
pub mod backend;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod http;
pub mod index_chroma;
pub mod index_mongo;
pub mod index_pinecone;
pub mod index_redis;
pub mod ingest;
pub mod listing;
pub mod llm;
pub mod server;
pub mod signing;
pub mod storage_oss;
pub mod storage_s3;
