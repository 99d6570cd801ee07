//! Conversation pipeline: one retrieval-grounded question-answering turn.
//!
//! ```text
//! question ─sanitize─▶ condense(history) ─▶ search(k) ─▶ answer(context, question)
//! ```
//!
//! History is a flat list of messages read by position: even indices are
//! the human, odd indices the assistant. Every human message must have its
//! answer, so an odd-length history is rejected with
//! [`Error::InvalidInput`] instead of silently misassigning roles.
//!
//! With an empty history the standalone question is the sanitized question
//! and the model is not called for condensation. Retrieval uses the
//! standalone question; the final answer prompt uses the original
//! (sanitized, not condensed) question.
//!
//! [`Conversation`] holds no per-call state and is shared across
//! concurrent requests behind an `Arc`.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::generation::ChatModel;
use crate::index::{VectorIndex, DEFAULT_K};
use crate::models::{Answer, Role, Turn};

/// Prompt that rewrites a follow-up into a standalone question.
pub const CONDENSE_TEMPLATE: &str = "Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:";

/// Prompt that answers from retrieved context only.
pub const QA_TEMPLATE: &str = "You are a helpful AI assistant. Use the following pieces of context to answer the question at the end.
If you don't know the answer, just say you don't know. DO NOT try to make up an answer.
If the question is not related to the context, politely respond that you are tuned to only answer questions that are related to the context.

{context}

Question: {question}
Helpful answer in markdown:";

/// Trim and replace embedded newlines with spaces.
///
/// Returns [`Error::InvalidInput`] if nothing is left.
pub fn sanitize_question(question: &str) -> Result<String> {
    let cleaned = question.trim().replace(['\r', '\n'], " ");
    if cleaned.is_empty() {
        return Err(Error::InvalidInput("question must not be empty".to_string()));
    }
    Ok(cleaned)
}

/// Read a flat history as alternating Human/Assistant turns, starting with Human.
pub fn turns_from_history<S: AsRef<str>>(history: &[S]) -> Vec<Turn> {
    history
        .iter()
        .enumerate()
        .map(|(i, text)| Turn {
            role: if i % 2 == 0 { Role::Human } else { Role::Assistant },
            text: text.as_ref().to_string(),
        })
        .collect()
}

/// Render turns as `Human: ...` / `Assistant: ...` lines.
pub fn format_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn condense_prompt(turns: &[Turn], question: &str) -> String {
    CONDENSE_TEMPLATE
        .replace("{chat_history}", &format_history(turns))
        .replace("{question}", question)
}

pub fn qa_prompt(context: &str, question: &str) -> String {
    QA_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question)
}

/// A configured question-answering pipeline over one vector index.
#[derive(Clone)]
pub struct Conversation {
    index: Arc<dyn VectorIndex>,
    model: Arc<dyn ChatModel>,
    k: usize,
}

impl Conversation {
    pub fn new(index: Arc<dyn VectorIndex>, model: Arc<dyn ChatModel>) -> Self {
        Self {
            index,
            model,
            k: DEFAULT_K,
        }
    }

    /// Set the number of chunks retrieved per turn. Must be positive.
    pub fn with_k(mut self, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::FatalConfig("retrieval.k must be >= 1".to_string()));
        }
        self.k = k;
        Ok(self)
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Answer one question given the prior conversation.
    pub async fn answer<S: AsRef<str> + Sync>(
        &self,
        question: &str,
        history: &[S],
    ) -> Result<Answer> {
        let question = sanitize_question(question)?;
        if history.len() % 2 != 0 {
            return Err(Error::InvalidInput(format!(
                "history must contain complete question/answer pairs, got {} messages",
                history.len()
            )));
        }
        let turns = turns_from_history(history);

        let standalone = self.standalone_question(&turns, &question).await?;
        debug!(standalone = %standalone, turns = turns.len(), "condensed question");

        let retrieved = self.index.search(&standalone, self.k).await?;
        let context = retrieved
            .chunks
            .iter()
            .map(|s| s.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let answer_text = self.model.generate(&qa_prompt(&context, &question)).await?;
        info!(
            model = self.model.model_name(),
            sources = retrieved.len(),
            "answered question"
        );

        Ok(Answer {
            answer_text: answer_text.trim().to_string(),
            source_chunks: retrieved.chunks.into_iter().map(|s| s.chunk).collect(),
        })
    }

    /// Rewrite `question` to stand alone. No model call without history.
    pub async fn standalone_question(&self, turns: &[Turn], question: &str) -> Result<String> {
        if turns.is_empty() {
            return Ok(question.to_string());
        }
        let condensed = self.model.generate(&condense_prompt(turns, question)).await?;
        let condensed = condensed.trim();
        if condensed.is_empty() {
            return Ok(question.to_string());
        }
        Ok(condensed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::index::memory::MemoryVectorIndex;
    use crate::models::{Chunk, EmbeddedChunk, Metadata};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records prompts; replies "rewritten" to condense prompts.
    #[derive(Default)]
    struct Recorder {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for Recorder {
        fn model_name(&self) -> &str {
            "recorder"
        }
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if prompt.starts_with("Given the following conversation") {
                Ok("  What is the capital of France?  ".into())
            } else {
                Ok(" Paris. ".into())
            }
        }
    }

    struct Keyword;

    #[async_trait]
    impl Embedder for Keyword {
        fn model_name(&self) -> &str {
            "keyword"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.to_lowercase().contains("france") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    async fn setup() -> (Conversation, Arc<Recorder>) {
        let index = Arc::new(MemoryVectorIndex::new(Arc::new(Keyword)));
        let record = |id: &str, text: &str, vector: Vec<f32>| EmbeddedChunk {
            chunk: Chunk {
                id: id.into(),
                text: text.into(),
                metadata: Metadata::new(),
            },
            vector,
        };
        index
            .upsert(&[
                record("fr", "Paris is the capital of France.", vec![1.0, 0.0]),
                record("de", "Berlin is in Germany.", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        let model = Arc::new(Recorder::default());
        let conversation = Conversation::new(index, model.clone()).with_k(1).unwrap();
        (conversation, model)
    }

    #[test]
    fn test_sanitize_question() {
        assert_eq!(
            sanitize_question("  What is\nX?\n").unwrap(),
            "What is X?"
        );
        assert!(matches!(
            sanitize_question(" \n "),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_history_parity() {
        let turns = turns_from_history(&["Q1", "A1", "Q2"]);
        assert_eq!(
            turns,
            vec![Turn::human("Q1"), Turn::assistant("A1"), Turn::human("Q2")]
        );
    }

    #[test]
    fn test_prompts_carry_content() {
        let turns = turns_from_history(&["Hi", "Hello"]);
        let condense = condense_prompt(&turns, "And then?");
        assert!(condense.contains("Human: Hi\nAssistant: Hello"));
        assert!(condense.contains("Follow Up Input: And then?"));

        let qa = qa_prompt("ctx one\n\nctx two", "Why?");
        assert!(qa.contains("just say you don't know"));
        assert!(qa.contains("politely respond"));
        assert!(qa.contains("ctx one\n\nctx two"));
        assert!(qa.ends_with("Question: Why?\nHelpful answer in markdown:"));
    }

    #[tokio::test]
    async fn test_empty_history_skips_condensation() {
        let (conversation, model) = setup().await;
        let answer = conversation
            .answer::<&str>("What is the capital of\nFrance?", &[])
            .await
            .unwrap();

        assert_eq!(answer.answer_text, "Paris.");
        assert_eq!(answer.source_chunks.len(), 1);
        assert_eq!(answer.source_chunks[0].id, "fr");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Question: What is the capital of France?"));
    }

    #[tokio::test]
    async fn test_history_condenses_but_answers_original() {
        let (conversation, model) = setup().await;
        let answer = conversation
            .answer("And its capital?", &["Tell me about France", "It is a country."])
            .await
            .unwrap();
        assert_eq!(answer.source_chunks[0].id, "fr");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("Human: Tell me about France"));
        assert!(prompts[1].contains("Question: And its capital?"));
        assert!(prompts[1].contains("Paris is the capital of France."));
    }

    #[tokio::test]
    async fn test_unpaired_history_rejected() {
        let (conversation, model) = setup().await;
        let err = conversation
            .answer("Q2", &["Q1", "A1", "Q1b"])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_zero_k_rejected() {
        let index = Arc::new(MemoryVectorIndex::new(Arc::new(Keyword)));
        let model = Arc::new(Recorder::default());
        assert!(Conversation::new(index, model).with_k(0).is_err());
    }
}
