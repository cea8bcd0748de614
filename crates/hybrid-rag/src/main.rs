//! # Hybrid RAG CLI (`hrag`)
//!
//! ## Usage
//!
//! ```bash
//! hrag --config ./config/hrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hrag init` | Create the SQLite database, tables, and the configured index |
//! | `hrag index text\|images\|all` | Chunk, encode, and index the configured sources |
//! | `hrag search "<query>"` | Hybrid search, optionally with `--image` |
//! | `hrag ask "<query>"` | Retrieve, build a prompt, and generate an answer |
//! | `hrag serve` | Start the HTTP chat server |
//!
//! Logs go to stderr; set `RUST_LOG=debug` to see query specs and skipped
//! items in detail.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hybrid_rag::ingest::IndexTarget;
use hybrid_rag::sqlite_store::SqliteStore;
use hybrid_rag::{chat, config, ingest, search, server};

/// Hybrid RAG: multimodal retrieval and prompt assembly over a local index.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/hrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "hrag",
    about = "Hybrid multimodal retrieval and prompt assembly",
    version,
    long_about = "Hybrid RAG indexes text documents and product images into one SQLite index, \
    retrieves with BM25 plus text and image vector similarity, and assembles prompts for an \
    answer generator."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and create the configured index.
    ///
    /// Idempotent: running it again is safe. Fails if the index exists with
    /// different vector dimensions.
    Init,

    /// Index text files and/or images from the configured directories.
    Index {
        /// Which sources to index.
        #[arg(value_enum, default_value = "all")]
        target: IndexTarget,
    },

    /// Search the index.
    Search {
        /// Search query text.
        query: String,

        /// Image to add as a visual query.
        #[arg(long)]
        image: Option<PathBuf>,

        /// Maximum number of results (defaults to retrieval.top_k).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the generated query before the results.
        #[arg(long)]
        explain: bool,
    },

    /// Answer a question from retrieved context.
    Ask {
        /// The question.
        query: String,

        /// Image to add as a visual query.
        #[arg(long)]
        image: Option<PathBuf>,

        /// Print the assembled prompt instead of calling the generator.
        #[arg(long)]
        prompt_only: bool,
    },

    /// Start the HTTP chat server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteStore::open(&cfg).await?;
            store.pool().close().await;
            println!(
                "Database initialized successfully (index '{}').",
                cfg.index.name
            );
        }
        Commands::Index { target } => {
            ingest::run_index(&cfg, target).await?;
        }
        Commands::Search {
            query,
            image,
            top_k,
            explain,
        } => {
            search::run_search(&cfg, &query, image.as_deref(), top_k, explain).await?;
        }
        Commands::Ask {
            query,
            image,
            prompt_only,
        } => {
            chat::run_ask(&cfg, &query, image.as_deref(), prompt_only).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
