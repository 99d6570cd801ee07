//! The `docchat ingest` command.
//!
//! Selects the configured backends, runs one batch ingestion through
//! [`docchat_core::ingest::run_and_release`], and prints a summary. With
//! `--dry-run` only the blob listing runs; nothing is fetched or written.

use std::sync::Arc;

use anyhow::{Context, Result};
use docchat_core::chunk::Chunker;
use docchat_core::ingest::{run_and_release, IngestOptions};

use crate::backend::{open_blob_store, Backends};
use crate::config::Config;
use crate::extract::DocumentExtractor;

/// Ingestion options derived from the `[chunking]`, `[embedding]` and
/// `[ingest]` sections.
pub fn options_from_config(config: &Config) -> Result<IngestOptions> {
    let chunker = Chunker::new(config.chunking.window_size, config.chunking.overlap)
        .context("invalid [chunking] settings")?;
    Ok(IngestOptions {
        chunker,
        fetch_concurrency: config.ingest.fetch_concurrency,
        embed_batch_size: config.embedding.batch_size,
        on_missing: config.ingest.missing_policy(),
    })
}

pub async fn run_ingest(config: &Config, dry_run: bool) -> Result<()> {
    let options = options_from_config(config)?;

    if dry_run {
        let blobs = open_blob_store(&config.storage)?;
        let listed = blobs.list_document_keys().await;
        blobs.close().await?;
        let keys = listed.context("failed to list documents")?;
        println!("ingest {} (dry-run)", config.storage.bucket);
        println!("  documents found: {}", keys.len());
        for key in keys.iter().take(20) {
            println!("    {}", key);
        }
        if keys.len() > 20 {
            println!("    ... and {} more", keys.len() - 20);
        }
        return Ok(());
    }

    let backends = Backends::open(config)
        .await
        .context("failed to open backends")?;
    let summary = run_and_release(
        backends.blobs.as_ref(),
        backends.index.as_ref(),
        Arc::new(DocumentExtractor::new()),
        &options,
    )
    .await?;

    println!("ingest {}", config.storage.bucket);
    println!("  keys listed: {}", summary.keys_listed);
    println!("  blobs fetched: {}", summary.blobs_fetched);
    if summary.blobs_skipped > 0 {
        println!("  blobs skipped (missing): {}", summary.blobs_skipped);
    }
    println!("  documents extracted: {}", summary.documents);
    println!("  chunks: {}", summary.chunks);
    println!(
        "  records upserted: {} ({})",
        summary.records_upserted,
        backends.index.backend()
    );
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::ingest::MissingPolicy;

    #[test]
    fn test_options_from_config() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            backend = "s3"
            bucket = "docs"

            [vector]
            backend = "chroma"

            [chunking]
            window_size = 500
            overlap = 50

            [ingest]
            fetch_concurrency = 8
            on_missing = "skip"
            "#,
        )
        .unwrap();
        let options = options_from_config(&config).unwrap();
        assert_eq!(options.chunker.window_size(), 500);
        assert_eq!(options.chunker.overlap(), 50);
        assert_eq!(options.fetch_concurrency, 8);
        assert_eq!(options.embed_batch_size, 64);
        assert_eq!(options.on_missing, MissingPolicy::Skip);
    }
}
