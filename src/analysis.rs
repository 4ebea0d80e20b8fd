//! Chunk-then-combine SOW analysis.
//!
//! The text is split with [`chunk_text`](crate::chunk::chunk_text); each
//! chunk gets one model call asking for a risks/unclear/remediation triplet,
//! strictly in chunk order. A single combine call then merges the raw
//! per-chunk outputs. The combine output is parsed with
//! [`extract_json_object`]; if that fails the caller gets a
//! [`AnalysisOutcome::ParseFailure`] holding every raw output.
//!
//! Parsing is stricter than "whatever JSON came back": the combine output
//! must be an object whose `risks`, `unclear` and `remediation` keys, when
//! present, hold an array or a lone string. Output that parses as JSON but
//! has another shape (`{"risks": 3}`, a bare array) is reported as a
//! `ParseFailure` too, with the raw text kept for the caller.
//!
//! No stage retries. The first backend error aborts the run.

use std::sync::Arc;
use thiserror::Error;

use crate::chunk::chunk_text;
use crate::config::AnalysisConfig;
use crate::extract::ExtractError;
use crate::json_extract::extract_json_object;
use crate::llm::{ChatModel, CompletionRequest, LlmError};
use crate::models::{AnalysisOutcome, AnalysisVerdict, ChatMessage, ChunkResult};
use crate::runtime::BackendSelector;

/// Token budget per chunk.
pub const CHUNK_MAX_TOKENS: usize = 2500;
/// Item cap per category in a chunk-level answer.
pub const CHUNK_ITEMS_MAX: usize = 6;
/// Item cap per category in the combined answer.
pub const COMBINED_ITEMS_MAX: usize = 12;

/// Separator placed between raw chunk outputs in the combine prompt.
pub const COMBINE_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("No file uploaded and no text provided.")]
    NoInput,

    #[error("document contains no text")]
    EmptyDocument,

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

pub struct Analyzer {
    model: Arc<dyn ChatModel>,
    selector: Arc<BackendSelector>,
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(
        model: Arc<dyn ChatModel>,
        selector: Arc<BackendSelector>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            model,
            selector,
            config,
        }
    }

    /// Runs the full analysis over `text`.
    pub async fn analyze(&self, text: &str) -> Result<AnalysisOutcome, AnalyzeError> {
        if text.trim().is_empty() {
            return Err(AnalyzeError::EmptyDocument);
        }

        let chunks = chunk_text(text, self.config.chunk_max_tokens);
        let total = chunks.len();
        tracing::info!(chunks = total, chars = text.len(), "starting analysis");

        let instruction = chunk_instruction(self.config.chunk_items_max);
        let mut results = Vec::with_capacity(total);

        for chunk in &chunks {
            let req = CompletionRequest {
                messages: vec![
                    ChatMessage::system(instruction.as_str()),
                    ChatMessage::user(format!(
                        "SOW excerpt (chunk {}/{}):\n\n{}",
                        chunk.index + 1,
                        total,
                        chunk.text
                    )),
                ],
                model: self.config.model.clone(),
                max_tokens: self.config.chunk_output_tokens,
            };
            let raw = self.model.complete(&req).await?;
            tracing::debug!(chunk = chunk.index, bytes = raw.len(), "chunk analysed");
            results.push(ChunkResult {
                chunk_index: chunk.index,
                raw,
            });
        }

        let joined = results
            .iter()
            .map(|r| r.raw.as_str())
            .collect::<Vec<_>>()
            .join(COMBINE_SEPARATOR);
        let combine = CompletionRequest {
            messages: vec![
                ChatMessage::system(combine_instruction(self.config.combined_items_max)),
                ChatMessage::user(format!(
                    "Here are the raw JSON outputs from chunk analyses:\n\n{}",
                    joined
                )),
            ],
            model: self.config.model.clone(),
            max_tokens: self.config.combine_output_tokens,
        };
        let combined_raw = self.model.complete(&combine).await?;

        let verdict = extract_json_object(&combined_raw)
            .map_err(|e| e.to_string())
            .and_then(verdict_from_value);

        match verdict {
            Ok(analysis) => Ok(AnalysisOutcome::Complete {
                selection: self.selector.current(),
                chunks: total,
                analysis,
                raw_parts: results,
            }),
            Err(parse_error) => {
                tracing::warn!(error = %parse_error, "combined output is not valid JSON");
                Ok(AnalysisOutcome::ParseFailure {
                    parse_error,
                    combined_raw,
                    parts: results,
                })
            }
        }
    }
}

fn chunk_instruction(max_items: usize) -> String {
    format!(
        "You are an expert SOW/legal/contract analyst.\n\
         For the given SOW excerpt, provide:\n\
         1) A short list of likely hidden or risky clauses (max {max_items} items), labelled \"risks\".\n\
         2) A short list of items that are unclear or missing (max {max_items} items), labelled \"unclear\".\n\
         3) A concise suggested remediation or question to ask the vendor for each risk/unclear item, labelled \"remediation\".\n\
         Return JSON only with keys: risks (array of strings), unclear (array of strings), \
         remediation (array of short strings). Do not include any extra text."
    )
}

fn combine_instruction(max_items: usize) -> String {
    format!(
        "You are an expert SOW analyst. Combine multiple partial JSON results from previous \
         analysis into a single deduplicated JSON with keys: risks, unclear, remediation. \
         Keep each array short (max {max_items} items). Provide output as JSON only."
    )
}

/// Accepts an object whose known keys hold arrays (or a lone string).
/// Non-string items are kept as their JSON text.
fn verdict_from_value(value: serde_json::Value) -> Result<AnalysisVerdict, String> {
    let serde_json::Value::Object(map) = value else {
        return Err("combined output is not a JSON object".to_string());
    };

    let field = |key: &str| -> Result<Vec<String>, String> {
        match map.get(key) {
            None | Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(serde_json::Value::String(s)) => Ok(vec![s.clone()]),
            Some(serde_json::Value::Array(items)) => Ok(items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()),
            Some(_) => Err(format!("\"{}\" is not an array", key)),
        }
    };

    Ok(AnalysisVerdict {
        risks: field("risks")?,
        unclear: field("unclear")?,
        remediation: field("remediation")?,
    })
}
