//! # docchat core
//!
//! Runtime-agnostic logic for docchat: data models, error taxonomy,
//! chunking, the backend contracts, and the two pipelines built on them.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`models`] | `Document`, `Chunk`, `EmbeddedChunk`, `RetrievalResult`, `Turn`, `Answer` |
//! | [`error`] | `Error` taxonomy and `Result` alias |
//! | [`chunk`] | Overlapping sliding-window `Chunker` |
//! | [`storage`] | `BlobStore` contract + in-memory store |
//! | [`index`] | `VectorIndex` contract + in-memory index |
//! | [`embedding`] | `Embedder` contract + vector helpers |
//! | [`generation`] | `ChatModel` contract |
//! | [`extract`] | `Extractor` contract |
//! | [`ingest`] | Batch ingestion pipeline |
//! | [`conversation`] | Question-answering pipeline |
//!
//! This crate contains no network clients and no async runtime. Concrete
//! S3/OSS/Pinecone/Redis/MongoDB/Chroma adapters live in the `docchat`
//! application crate and are written against these traits only.

pub mod chunk;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod models;
pub mod storage;

pub use error::{Error, IngestStage, Result};
