//! Fakes shared by the integration tests: a keyword-count embedder, a
//! scripted chat model, and a small text corpus.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docchat::extract::DocumentExtractor;
use docchat_core::embedding::Embedder;
use docchat_core::generation::ChatModel;
use docchat_core::index::memory::MemoryVectorIndex;
use docchat_core::ingest::{run_ingestion, IngestOptions, IngestSummary};
use docchat_core::storage::memory::MemoryBlobStore;
use docchat_core::{Error, Result};

const VOCAB: &[&str] = &[
    "paris", "france", "berlin", "germany", "rome", "italy", "capital", "population",
];

/// One dimension per vocabulary word plus a small bias term.
pub struct Keywords;

#[async_trait]
impl Embedder for Keywords {
    fn model_name(&self) -> &str {
        "keywords"
    }

    fn dims(&self) -> usize {
        VOCAB.len() + 1
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; VOCAB.len() + 1];
                for word in text
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    if let Some(i) = VOCAB.iter().position(|&known| known == word) {
                        v[i] += 1.0;
                    }
                }
                v[VOCAB.len()] = 0.1;
                v
            })
            .collect())
    }
}

pub const CONDENSE_PREFIX: &str = "Given the following conversation";

/// Replies `condensed` to condensation prompts and `answer` to everything
/// else, recording every prompt.
pub struct Scripted {
    pub condensed: String,
    pub answer: String,
    pub fail: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl Scripted {
    pub fn new(condensed: &str, answer: &str) -> Self {
        Self {
            condensed: condensed.to_string(),
            answer: answer.to_string(),
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("", "")
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for Scripted {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(Error::capability("scripted", "model is down"));
        }
        if prompt.starts_with(CONDENSE_PREFIX) {
            Ok(self.condensed.clone())
        } else {
            Ok(self.answer.clone())
        }
    }
}

pub fn corpus() -> MemoryBlobStore {
    MemoryBlobStore::new(2)
        .with_blob(
            "facts/paris.txt",
            "Paris is the capital of France. Paris has about two million residents.",
        )
        .with_blob("facts/berlin.md", "Berlin is the capital of Germany.")
        .with_blob("facts/rome.txt", "Rome is the capital of Italy.")
}

/// Ingest [`corpus`] into a fresh in-memory index.
pub async fn ingested() -> (Arc<MemoryVectorIndex>, IngestSummary) {
    let blobs = corpus();
    let index = Arc::new(MemoryVectorIndex::new(Arc::new(Keywords)));
    let summary = run_ingestion(
        &blobs,
        index.as_ref(),
        Arc::new(DocumentExtractor::new()),
        &IngestOptions::default(),
    )
    .await
    .expect("ingestion succeeds");
    (index, summary)
}

/// A one-page PDF whose content stream shows text without declaring a
/// font. The xref offsets are computed so the file itself parses.
pub fn fontless_pdf() -> Vec<u8> {
    let content = "BT (Hello) Tj ET";
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ),
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = pdf.len();
    let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        tail.push_str(&format!("{:010} 00000 n \n", offset));
    }
    tail.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref
    ));
    pdf.extend_from_slice(tail.as_bytes());
    pdf
}
