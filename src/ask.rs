//! The `docchat ask` and `docchat check` commands.

use anyhow::{Context, Result};
use docchat_core::models::Answer;

use crate::backend::Backends;
use crate::config::Config;

/// Answer one question and print the answer followed by its sources.
///
/// `history` alternates question and answer, oldest first.
pub async fn run_ask(
    config: &Config,
    question: &str,
    history: &[String],
    json: bool,
) -> Result<()> {
    let backends = Backends::open(config)
        .await
        .context("failed to open backends")?;
    let answered = match backends.conversation() {
        Ok(conversation) => conversation.answer(question, history).await,
        Err(e) => Err(e),
    };
    backends.release().await?;
    let answer = answered?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print!("{}", render_answer(&answer));
    }
    Ok(())
}

fn render_answer(answer: &Answer) -> String {
    let mut out = format!("{}\n", answer.answer_text);
    if answer.source_chunks.is_empty() {
        return out;
    }
    out.push_str("\nsources:\n");
    for (i, chunk) in answer.source_chunks.iter().enumerate() {
        let source = chunk
            .metadata
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or("(unknown)");
        match chunk.metadata.get("page").and_then(|v| v.as_u64()) {
            Some(page) => out.push_str(&format!("  {}. {} (page {})\n", i + 1, source, page)),
            None => out.push_str(&format!("  {}. {}\n", i + 1, source)),
        }
    }
    out
}

/// Select every backend and run the readiness checks, then release them.
pub async fn run_check(config: &Config) -> Result<()> {
    let backends = Backends::open(config)
        .await
        .context("backend check failed")?;
    println!("check");
    println!("  storage: {} (bucket {})", backends.blobs.name(), config.storage.bucket);
    println!(
        "  vector: {} (embedding {} / {} dims)",
        backends.index.backend(),
        backends.index.embedder().model_name(),
        backends.index.embedder().dims()
    );
    println!("  llm: {}", backends.model.model_name());
    backends.release().await?;
    println!("ok");
    Ok(())
}
