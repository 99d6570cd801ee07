//! End-to-end ingest → answer with in-memory backends and the real
//! document extractor.

mod common;

use std::sync::Arc;

use common::{corpus, fontless_pdf, ingested, Keywords, Scripted};
use docchat::extract::DocumentExtractor;
use docchat_core::conversation::Conversation;
use docchat_core::index::memory::MemoryVectorIndex;
use docchat_core::index::VectorIndex;
use docchat_core::ingest::{run_and_release, run_ingestion, IngestOptions};
use docchat_core::storage::BlobStore;
use docchat_core::error::IngestStage;
use docchat_core::extract::Extractor;
use docchat_core::Error;

#[tokio::test]
async fn ingest_counts_every_stage() {
    let (index, summary) = ingested().await;
    assert_eq!(summary.keys_listed, 3);
    assert_eq!(summary.blobs_fetched, 3);
    assert_eq!(summary.documents, 3);
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.records_upserted, 3);
    assert_eq!(index.len(), 3);
}

#[tokio::test]
async fn first_turn_answers_without_condensing() {
    let (index, _) = ingested().await;
    let model = Arc::new(Scripted::new("unused", "  Paris.  "));
    let conversation = Conversation::new(index, model.clone());

    let history: [&str; 0] = [];
    let answer = conversation
        .answer("What is the capital of France?", &history)
        .await
        .unwrap();

    assert_eq!(answer.answer_text, "Paris.");
    assert_eq!(answer.source_chunks.len(), 3);
    assert_eq!(answer.source_chunks[0].metadata["source"], "facts/paris.txt");

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 1, "no condensation call on an empty history");
    assert!(prompts[0].contains("Paris is the capital of France."));
    assert!(prompts[0].contains("Question: What is the capital of France?"));
}

#[tokio::test]
async fn follow_up_retrieves_with_condensed_question() {
    let (index, _) = ingested().await;
    let model = Arc::new(Scripted::new("What is the capital of Germany?", "Berlin."));
    let conversation = Conversation::new(index, model.clone()).with_k(1).unwrap();

    let history = ["What is the capital of France?", "Paris."];
    let answer = conversation.answer("And Germany?", &history).await.unwrap();

    assert_eq!(answer.source_chunks.len(), 1);
    assert_eq!(answer.source_chunks[0].metadata["source"], "facts/berlin.md");

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("Human: What is the capital of France?"));
    assert!(prompts[0].contains("Assistant: Paris."));
    assert!(prompts[0].contains("Follow Up Input: And Germany?"));
    // The answer prompt keeps the user's wording.
    assert!(prompts[1].contains("Question: And Germany?"));
}

#[tokio::test]
async fn unpaired_history_is_rejected() {
    let (index, _) = ingested().await;
    let model = Arc::new(Scripted::new("", ""));
    let conversation = Conversation::new(index, model.clone());

    let err = conversation
        .answer("And Germany?", &["What is the capital of France?"])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(model.prompts().is_empty());
}

#[tokio::test]
async fn reingesting_overwrites_records() {
    let blobs = corpus();
    let index = MemoryVectorIndex::new(Arc::new(Keywords));
    let extractor = Arc::new(DocumentExtractor::new());
    let options = IngestOptions::default();

    run_ingestion(&blobs, &index, extractor.clone(), &options).await.unwrap();
    run_ingestion(&blobs, &index, extractor, &options).await.unwrap();
    assert_eq!(index.len(), 3);
}

#[tokio::test]
async fn unsupported_blob_aborts_the_run() {
    let blobs = corpus().with_blob("facts/table.xlsx", "PK");
    let index = MemoryVectorIndex::new(Arc::new(Keywords));

    let err = run_ingestion(
        &blobs,
        &index,
        Arc::new(DocumentExtractor::new()),
        &IngestOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Ingestion { .. }));
    assert!(err.to_string().contains("facts/table.xlsx"));
    assert!(index.is_empty());
}

#[tokio::test]
async fn release_closes_both_backends() {
    let blobs = corpus();
    let index = MemoryVectorIndex::new(Arc::new(Keywords));

    run_and_release(
        &blobs,
        &index,
        Arc::new(DocumentExtractor::new()),
        &IngestOptions::default(),
    )
    .await
    .unwrap();

    assert!(blobs.is_closed());
    assert!(index.is_closed());
    assert!(blobs.list_document_keys().await.is_err());
    assert!(index.search("capital", 1).await.is_err());
}

#[test]
fn fontless_pdf_is_an_extraction_error() {
    let err = DocumentExtractor::new()
        .extract("scans/bad.pdf", &fontless_pdf())
        .unwrap_err();
    assert!(matches!(err, Error::Extraction { ref key, .. } if key == "scans/bad.pdf"));
}

#[tokio::test]
async fn malformed_pdf_fails_the_run_and_releases() {
    let blobs = corpus().with_blob("scans/bad.pdf", fontless_pdf());
    let index = MemoryVectorIndex::new(Arc::new(Keywords));

    let err = run_and_release(
        &blobs,
        &index,
        Arc::new(DocumentExtractor::new()),
        &IngestOptions::default(),
    )
    .await
    .unwrap_err();

    match err {
        Error::Ingestion { stage, source } => {
            assert_eq!(stage, IngestStage::Extract);
            assert!(matches!(*source, Error::Extraction { ref key, .. } if key == "scans/bad.pdf"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(blobs.is_closed());
    assert!(index.is_closed());
    assert!(index.is_empty());
}
