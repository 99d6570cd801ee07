//! Core data models used throughout docchat.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the ingestion and conversation pipelines.

use serde::{Deserialize, Serialize};

/// Scalar-valued metadata attached to documents and chunks.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding the originating blob key.
pub const SOURCE_KEY: &str = "source";

/// Source content extracted from a blob (one PDF page, one text file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// The `source` metadata value, if set.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(|v| v.as_str())
    }
}

/// A bounded slice of a [`Document`]'s content, the unit that is embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic identifier, stable across re-ingestion of the same blob.
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// A [`Chunk`] paired with its embedding, alive only between embed and upsert.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A retrieved chunk with its relevance score (higher is more relevant).
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Chunks returned by a similarity search, ordered by descending score.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Sort by descending score and keep at most `k` entries.
    pub fn ranked(mut self, k: usize) -> Self {
        self.chunks.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.chunks.truncate(k);
        self
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Human,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::Human => "Human",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Result of one conversation turn: the answer and the chunks it cites.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub answer_text: String,
    pub source_chunks: Vec<Chunk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(id: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: id.to_string(),
                text: id.to_string(),
                metadata: Metadata::new(),
            },
            score,
        }
    }

    #[test]
    fn test_ranked_sorts_and_truncates() {
        let result = RetrievalResult {
            chunks: vec![scored("a", 0.1), scored("b", 0.9), scored("c", 0.5)],
        }
        .ranked(2);
        let ids: Vec<_> = result.chunks.iter().map(|s| s.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_answer_serializes_camel_case() {
        let answer = Answer {
            answer_text: "42".into(),
            source_chunks: vec![],
        };
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["answerText"], "42");
        assert!(json["sourceChunks"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_document_source() {
        let doc = Document::new("body").with_metadata(SOURCE_KEY, "docs/a.pdf");
        assert_eq!(doc.source(), Some("docs/a.pdf"));
        assert_eq!(Document::new("x").source(), None);
    }
}
