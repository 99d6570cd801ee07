//! Text extraction for fetched blobs.
//!
//! The format is chosen from the key's extension:
//!
//! | Extension | Result |
//! |-----------|--------|
//! | `.pdf` | One [`Document`] per non-blank page, via `pdf-extract` |
//! | `.txt`, `.md` | One [`Document`] with the whole blob (lossy UTF-8) |
//! | anything else | [`Error::Extraction`] |
//!
//! PDF pages carry `page` (1-based) and `total_pages` metadata. Every
//! document carries `source`; the ingestion pipeline overwrites it with the
//! blob key anyway.

use docchat_core::extract::{panic_message, Extractor};
use docchat_core::models::{Document, SOURCE_KEY};
use docchat_core::{Error, Result};

/// Extractor for the formats listed in the module docs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

impl DocumentExtractor {
    pub fn new() -> Self {
        Self
    }
}

fn extension(key: &str) -> String {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

fn extraction_error(key: &str, message: String) -> Error {
    Error::Extraction {
        key: key.to_string(),
        message,
    }
}

// pdf-extract panics on some malformed fonts and content streams.
fn extract_pdf(key: &str, blob: &[u8]) -> Result<Vec<Document>> {
    let parsed = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(blob));
    let pages = match parsed {
        Ok(Ok(pages)) => pages,
        Ok(Err(e)) => {
            return Err(extraction_error(key, format!("PDF extraction failed: {}", e)))
        }
        Err(payload) => {
            return Err(extraction_error(
                key,
                format!("PDF parser panicked: {}", panic_message(payload.as_ref())),
            ))
        }
    };
    let total = pages.len();
    Ok(pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| {
            Document::new(text)
                .with_metadata(SOURCE_KEY, key)
                .with_metadata("page", i + 1)
                .with_metadata("total_pages", total)
        })
        .collect())
}

fn extract_plain(key: &str, blob: &[u8]) -> Vec<Document> {
    let text = String::from_utf8_lossy(blob);
    if text.trim().is_empty() {
        return Vec::new();
    }
    vec![Document::new(text.into_owned()).with_metadata(SOURCE_KEY, key)]
}

impl Extractor for DocumentExtractor {
    fn extract(&self, key: &str, blob: &[u8]) -> Result<Vec<Document>> {
        match extension(key).as_str() {
            "pdf" => extract_pdf(key, blob),
            "txt" | "md" => Ok(extract_plain(key, blob)),
            "" => Err(extraction_error(key, "no file extension".to_string())),
            other => Err(extraction_error(key, format!("unsupported file type: .{}", other))),
        }
    }
}
