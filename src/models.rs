//! Core data types that flow through the extraction → chunking → analysis pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// An upload written to the transient upload directory.
///
/// Lives only for the duration of one request; the server deletes it right
/// after extraction, whatever the outcome.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub path: PathBuf,
    /// File name as sent by the client; the extension drives extractor dispatch.
    pub original_name: String,
}

/// An ordered, trimmed slice of extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// Which family of backend answers model calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "mock")]
    Mock,
    #[serde(rename = "openai", alias = "cloud")]
    Cloud,
    #[serde(rename = "local")]
    Local,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Mock => "mock",
            Mode::Cloud => "openai",
            Mode::Local => "local",
        }
    }

    /// Parses a wire mode name. `cloud` is accepted as an alias of `openai`.
    pub fn parse(s: &str) -> Option<Mode> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Some(Mode::Mock),
            "openai" | "cloud" => Some(Mode::Cloud),
            "local" => Some(Mode::Local),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two local inference servers the router knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalEngine {
    /// Chat-style server (`/api/chat`).
    Ollama,
    /// Generate-style server (`/api/v1/generate`).
    TextGen,
}

impl LocalEngine {
    pub const ALL: [LocalEngine; 2] = [LocalEngine::Ollama, LocalEngine::TextGen];

    pub fn as_str(&self) -> &'static str {
        match self {
            LocalEngine::Ollama => "ollama",
            LocalEngine::TextGen => "textgen",
        }
    }

    pub fn parse(s: &str) -> Option<LocalEngine> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(LocalEngine::Ollama),
            "textgen" => Some(LocalEngine::TextGen),
            _ => None,
        }
    }
}

/// Process-wide backend choice, as reported over the wire.
///
/// `local_engine` keeps the raw name so that an unknown engine can be stored
/// and rejected only when a call is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSelection {
    pub mode: Mode,
    pub local_engine: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One selectable entry in `GET /llm-options`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendOption {
    pub id: String,
    pub label: String,
}

/// Unparsed output of one per-chunk model call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub raw: String,
}

/// The merged risk/unclear/remediation triplet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisVerdict {
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub unclear: Vec<String>,
    #[serde(default)]
    pub remediation: Vec<String>,
}

/// Result of a whole analysis run.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Complete {
        selection: RuntimeSelection,
        chunks: usize,
        analysis: AnalysisVerdict,
        raw_parts: Vec<ChunkResult>,
    },
    /// The combine output could not be parsed; every raw output is kept.
    ParseFailure {
        parse_error: String,
        combined_raw: String,
        parts: Vec<ChunkResult>,
    },
}

impl AnalysisOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, AnalysisOutcome::Complete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_wire_names() {
        assert_eq!(serde_json::to_string(&Mode::Cloud).unwrap(), "\"openai\"");
        assert_eq!(Mode::parse("cloud"), Some(Mode::Cloud));
        assert_eq!(Mode::parse(" LOCAL "), Some(Mode::Local));
        assert_eq!(Mode::parse("invalid"), None);
    }

    #[test]
    fn selection_serializes_camel_case() {
        let sel = RuntimeSelection {
            mode: Mode::Local,
            local_engine: "textgen".to_string(),
        };
        let json = serde_json::to_value(&sel).unwrap();
        assert_eq!(json["mode"], "local");
        assert_eq!(json["localEngine"], "textgen");
    }

    #[test]
    fn verdict_missing_keys_default_to_empty() {
        let v: AnalysisVerdict = serde_json::from_str(r#"{"risks":["a"]}"#).unwrap();
        assert_eq!(v.risks, vec!["a"]);
        assert!(v.unclear.is_empty());
        assert!(v.remediation.is_empty());
    }
}
