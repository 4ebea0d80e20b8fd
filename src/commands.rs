//! CLI command implementations.
//!
//! Each `run_*` function backs one `sow-analyzer` subcommand and prints its
//! result to stdout. They share the same building blocks as the HTTP server,
//! so a file analysed here goes through exactly the same pipeline.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::analysis::{AnalyzeError, Analyzer};
use crate::chunk::{chunk_text, estimate_tokens};
use crate::config::Config;
use crate::extract::extract_file;
use crate::llm::ModelRouter;
use crate::runtime::BackendSelector;
use crate::server::AnalyzeBody;

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn read_document(config: &Config, path: &Path) -> Result<String> {
    extract_file(path, &display_name(path), &config.extract)
        .await
        .with_context(|| format!("Failed to extract text from {}", path.display()))
}

/// `sow-analyzer analyze`: runs one analysis and prints the same JSON body
/// the HTTP endpoint would return.
pub async fn run_analyze(
    config: &Config,
    file: Option<PathBuf>,
    text: Option<String>,
    mode: Option<String>,
    local_engine: Option<String>,
) -> Result<()> {
    let selector = Arc::new(BackendSelector::new(&config.backends));
    if mode.is_some() || local_engine.is_some() {
        let mode = mode.unwrap_or_else(|| selector.current().mode.as_str().to_string());
        selector.select(Some(&mode), local_engine.as_deref())?;
    }

    let router = ModelRouter::new(&config.backends, selector.clone())?;
    let analyzer = Analyzer::new(Arc::new(router), selector, config.analysis.clone());

    let text = match (file, text) {
        (Some(path), _) => read_document(config, &path).await?,
        (None, Some(text)) if !text.is_empty() => text,
        _ => return Err(AnalyzeError::NoInput.into()),
    };

    let outcome = analyzer.analyze(&text).await?;
    let body = AnalyzeBody::from(outcome);
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// `sow-analyzer extract`: prints the extracted text of a file.
pub async fn run_extract(config: &Config, path: &Path) -> Result<()> {
    let text = read_document(config, path).await?;
    println!("{}", text);
    Ok(())
}

/// `sow-analyzer chunk`: prints the chunks a file would be analysed in.
pub async fn run_chunk(config: &Config, path: &Path, max_tokens: Option<usize>) -> Result<()> {
    let text = read_document(config, path).await?;
    let max_tokens = max_tokens.unwrap_or(config.analysis.chunk_max_tokens);
    let chunks = chunk_text(&text, max_tokens);

    println!(
        "--- Chunks ({}) at {} tokens, ~{} tokens total ---",
        chunks.len(),
        max_tokens,
        estimate_tokens(&text)
    );
    for chunk in &chunks {
        println!("[chunk {}] ~{} tokens", chunk.index, estimate_tokens(&chunk.text));
        println!("{}", chunk.text);
        println!();
    }
    Ok(())
}

/// `sow-analyzer options`: prints the selectable backends.
pub fn run_options(config: &Config) -> Result<()> {
    let selector = BackendSelector::new(&config.backends);
    let current = selector.current();

    println!("{:<16} LABEL", "ID");
    for opt in selector.available_options() {
        println!("{:<16} {}", opt.id, opt.label);
    }
    println!();
    println!("current:      {}", current.mode);
    println!("local engine: {}", current.local_engine);
    if selector.is_forced_mock() {
        println!("forced mock:  yes (USE_MOCK)");
    }
    Ok(())
}
