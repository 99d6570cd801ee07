//! Text-extraction capability trait.

use std::any::Any;

use crate::error::Result;
use crate::models::Document;

/// Turns a raw blob into an ordered sequence of [`Document`]s (one per page
/// for paged formats).
///
/// Extraction is CPU-bound and synchronous. The ingestion pipeline runs it
/// on tokio's blocking pool, and a panicking extractor fails the run with an
/// extraction error. Implementations may set any metadata, but the pipeline
/// overwrites `source` with the blob key.
pub trait Extractor: Send + Sync {
    fn extract(&self, key: &str, blob: &[u8]) -> Result<Vec<Document>>;
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
