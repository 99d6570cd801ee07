//! Ingestion pipeline orchestration.
//!
//! Coordinates the one-shot batch flow: blob listing → concurrent fetch and
//! extraction → chunking → embedding → a single upsert into the vector
//! index. Extraction runs on tokio's blocking pool so that parsing one large
//! PDF does not stall the fetches in flight.
//!
//! Any failing stage aborts the run with [`Error::Ingestion`] naming the
//! stage. There is no rollback: backends that accept writes in several
//! requests (Pinecone batches, MongoDB per-record upserts) may keep what
//! was written before the failure. Chunk ids are deterministic, so a full
//! rerun overwrites those records instead of duplicating them.
//!
//! [`run_and_release`] is the entry point for batch jobs: it closes the
//! blob store and the vector index on every exit path.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::chunk::Chunker;
use crate::error::{Error, IngestStage, Result};
use crate::extract::{panic_message, Extractor};
use crate::index::VectorIndex;
use crate::models::{Document, EmbeddedChunk, SOURCE_KEY};
use crate::storage::BlobStore;

/// What to do when a listed key is gone by the time it is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    /// Fail the whole run.
    #[default]
    Abort,
    /// Log a warning and continue without the blob.
    Skip,
}

/// Tuning knobs for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub chunker: Chunker,
    /// Maximum number of blob fetches in flight.
    pub fetch_concurrency: usize,
    /// Texts per embedding request.
    pub embed_batch_size: usize,
    pub on_missing: MissingPolicy,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunker: Chunker::default(),
            fetch_concurrency: 4,
            embed_batch_size: 64,
            on_missing: MissingPolicy::Abort,
        }
    }
}

/// Counters reported at the end of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub keys_listed: usize,
    pub blobs_fetched: usize,
    pub blobs_skipped: usize,
    pub documents: usize,
    pub chunks: usize,
    pub records_upserted: usize,
}

/// Run a full ingestion of every key in `blobs` into `index`.
///
/// Embeddings come from the index's own embedder so that stored vectors
/// and query vectors share one model. Connections are left open; see
/// [`run_and_release`].
pub async fn run_ingestion(
    blobs: &dyn BlobStore,
    index: &dyn VectorIndex,
    extractor: Arc<dyn Extractor>,
    options: &IngestOptions,
) -> Result<IngestSummary> {
    let result = ingest(blobs, index, extractor, options).await;
    if let Err(e) = &result {
        error!(
            store = blobs.name(),
            index = index.backend(),
            error = %e,
            "ingestion failed"
        );
    }
    result
}

/// Run [`run_ingestion`], then close the blob store and the vector index
/// whether or not the run succeeded.
///
/// An ingestion error takes precedence over a failure to close.
pub async fn run_and_release(
    blobs: &dyn BlobStore,
    index: &dyn VectorIndex,
    extractor: Arc<dyn Extractor>,
    options: &IngestOptions,
) -> Result<IngestSummary> {
    let result = run_ingestion(blobs, index, extractor, options).await;
    let released = release(blobs, index).await;
    let summary = result?;
    released?;
    Ok(summary)
}

/// Close both adapters, attempting the second even if the first fails.
pub async fn release(blobs: &dyn BlobStore, index: &dyn VectorIndex) -> Result<()> {
    let store_closed = blobs.close().await;
    let index_closed = index.close().await;
    if let Err(e) = &store_closed {
        warn!(store = blobs.name(), error = %e, "failed to close blob store");
    }
    if let Err(e) = &index_closed {
        warn!(index = index.backend(), error = %e, "failed to close vector index");
    }
    store_closed.and(index_closed)
}

async fn ingest(
    blobs: &dyn BlobStore,
    index: &dyn VectorIndex,
    extractor: Arc<dyn Extractor>,
    options: &IngestOptions,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();

    // List
    let keys = blobs
        .list_document_keys()
        .await
        .map_err(|e| e.during(IngestStage::List))?;
    summary.keys_listed = keys.len();
    info!(store = blobs.name(), keys = keys.len(), "listed document keys");

    // Fetch + extract. `buffered` yields in key order however fetches
    // complete, so every document is tagged with its own key.
    let mut fetches = stream::iter(keys)
        .map(|key| {
            let extractor = Arc::clone(&extractor);
            async move {
                let loaded = match blobs.fetch(&key).await {
                    Ok(bytes) => {
                        let size = bytes.len();
                        Ok((size, extract_blocking(extractor, &key, bytes).await))
                    }
                    Err(e) => Err(e),
                };
                (key, loaded)
            }
        })
        .buffered(options.fetch_concurrency.max(1));

    let mut documents: Vec<Document> = Vec::new();
    while let Some((key, loaded)) = fetches.next().await {
        let (size, extracted) = match loaded {
            Ok(loaded) => loaded,
            Err(Error::NotFound { .. }) if options.on_missing == MissingPolicy::Skip => {
                warn!(key = %key, "blob vanished before fetch, skipping");
                summary.blobs_skipped += 1;
                continue;
            }
            Err(e) => return Err(e.during(IngestStage::Fetch)),
        };
        summary.blobs_fetched += 1;

        let extracted = extracted.map_err(|e| e.during(IngestStage::Extract))?;
        debug!(key = %key, bytes = size, documents = extracted.len(), "extracted");
        documents.extend(
            extracted
                .into_iter()
                .map(|doc| doc.with_metadata(SOURCE_KEY, key.as_str())),
        );
    }
    drop(fetches);
    summary.documents = documents.len();

    // Chunk
    let chunks = options.chunker.split(&documents);
    drop(documents);
    summary.chunks = chunks.len();
    info!(chunks = chunks.len(), "split documents");

    // Embed
    let embedder = index.embedder();
    let batch_size = options.embed_batch_size.max(1);
    let mut embedded: Vec<EmbeddedChunk> = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed_documents(&texts)
            .await
            .map_err(|e| e.during(IngestStage::Embed))?;
        if vectors.len() != batch.len() {
            return Err(Error::capability(
                embedder.model_name(),
                format!(
                    "returned {} embeddings for {} inputs",
                    vectors.len(),
                    batch.len()
                ),
            )
            .during(IngestStage::Embed));
        }
        embedded.extend(
            batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, vector)| EmbeddedChunk { chunk, vector }),
        );
        debug!(done = embedded.len(), total = chunks.len(), "embedded batch");
    }

    // Upsert, one batch per run
    index
        .upsert(&embedded)
        .await
        .map_err(|e| e.during(IngestStage::Upsert))?;
    summary.records_upserted = embedded.len();
    info!(
        index = index.backend(),
        records = embedded.len(),
        "ingestion complete"
    );

    Ok(summary)
}

/// Run the extractor on the blocking pool. A panic inside it becomes an
/// [`Error::Extraction`] for `key`.
async fn extract_blocking(
    extractor: Arc<dyn Extractor>,
    key: &str,
    bytes: Vec<u8>,
) -> Result<Vec<Document>> {
    let task_key = key.to_string();
    match tokio::task::spawn_blocking(move || extractor.extract(&task_key, &bytes)).await {
        Ok(result) => result,
        Err(e) => {
            let message = if e.is_panic() {
                format!("extractor panicked: {}", panic_message(e.into_panic().as_ref()))
            } else {
                "extraction task was cancelled".to_string()
            };
            Err(Error::Extraction {
                key: key.to_string(),
                message,
            })
        }
    }
}
