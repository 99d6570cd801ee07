//! # docchat CLI
//!
//! Chat with the documents in an object-storage bucket.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat ingest` | Index every matching document in the bucket |
//! | `docchat ask "<question>"` | Answer one question (optionally with history) |
//! | `docchat check` | Verify backend selection, credentials, and connectivity |
//! | `docchat serve` | Start the chat HTTP endpoint |
//!
//! ## Examples
//!
//! ```bash
//! # Preview which keys would be ingested
//! docchat ingest --dry-run
//!
//! # Ingest the bucket into the configured vector index
//! docchat ingest
//!
//! # Follow-up question with one prior exchange
//! docchat ask "And its population?" \
//!     --history "What is the capital of France?" --history "Paris."
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `docchat=info,docchat_core=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docchat::{ask, config, ingest, server};

/// docchat: retrieval-augmented chat over documents in S3 or OSS.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docchat.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "docchat", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one batch ingestion: list, fetch, extract, chunk, embed, upsert.
    ///
    /// Re-running over the same bucket overwrites existing records.
    Ingest {
        /// Only list the matching keys; fetch and write nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a single question against the indexed documents.
    Ask {
        /// The question to answer.
        question: String,

        /// Prior conversation messages, alternating question and answer.
        #[arg(long = "history")]
        history: Vec<String>,

        /// Print the raw `{answerText, sourceChunks}` JSON.
        #[arg(long)]
        json: bool,
    },

    /// Select the configured backends and check that they are reachable.
    Check,

    /// Start the chat HTTP endpoint on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docchat=info,docchat_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { dry_run } => {
            ingest::run_ingest(&cfg, dry_run).await?;
        }
        Commands::Ask {
            question,
            history,
            json,
        } => {
            ask::run_ask(&cfg, &question, &history, json).await?;
        }
        Commands::Check => {
            ask::run_check(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
