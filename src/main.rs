//! # SOW Analyzer CLI (`sow-analyzer`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sow-analyzer serve` | Start the HTTP API |
//! | `sow-analyzer analyze <file>` | Analyse a document and print the JSON result |
//! | `sow-analyzer extract <file>` | Print the extracted text |
//! | `sow-analyzer chunk <file>` | Print the chunks the analysis would use |
//! | `sow-analyzer options` | List selectable model backends |
//!
//! ## Examples
//!
//! ```bash
//! # Serve with defaults (0.0.0.0:5000, mock unless OPENAI_API_KEY is set)
//! sow-analyzer serve
//!
//! # Analyse a contract against a local Ollama instance
//! sow-analyzer analyze contract.pdf --mode local --local-engine ollama
//!
//! # Inline text, forced onto the mock backend
//! USE_MOCK=true sow-analyzer analyze --text "The vendor shall deliver..."
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sow_analyzer::{commands, config, logging, server};

/// SOW Analyzer: risk review of Statement of Work documents with a
/// selectable language model backend.
#[derive(Parser)]
#[command(
    name = "sow-analyzer",
    about = "Risk review of Statement of Work documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional. Without it every setting uses its default, with
    /// environment overrides (`OPENAI_API_KEY`, `USE_MOCK`, `PORT`,
    /// `ALLOWED_ORIGINS`) still applied. A `.env` file in the working
    /// directory or a parent supplies variables not already set.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    ///
    /// Binds to `[server].bind` (or `PORT`) and serves `/llm-options`,
    /// `/llm-select`, `/analyze` and `/api/health`.
    Serve,

    /// Analyse a document or inline text and print the JSON result.
    Analyze {
        /// Document to analyse. Takes precedence over `--text`.
        file: Option<PathBuf>,

        /// Inline SOW text.
        #[arg(long)]
        text: Option<String>,

        /// Backend mode: `mock`, `openai`, `local` or `local:<engine>`.
        #[arg(long)]
        mode: Option<String>,

        /// Local engine used in `local` mode: `ollama` or `textgen`.
        #[arg(long)]
        local_engine: Option<String>,
    },

    /// Print the text extracted from a document.
    Extract {
        /// Document to read.
        file: PathBuf,
    },

    /// Print the chunks a document is split into.
    Chunk {
        /// Document to read.
        file: PathBuf,

        /// Override `[analysis].chunk_max_tokens`.
        #[arg(long)]
        max_tokens: Option<usize>,
    },

    /// List selectable model backends and the initial selection.
    Options,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::Config::from_env_only()?,
    };
    logging::init_tracing(&cfg.logging);

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Analyze {
            file,
            text,
            mode,
            local_engine,
        } => {
            commands::run_analyze(&cfg, file, text, mode, local_engine).await?;
        }
        Commands::Extract { file } => {
            commands::run_extract(&cfg, &file).await?;
        }
        Commands::Chunk { file, max_tokens } => {
            commands::run_chunk(&cfg, &file, max_tokens).await?;
        }
        Commands::Options => {
            commands::run_options(&cfg)?;
        }
    }

    Ok(())
}
