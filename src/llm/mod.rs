//! Chat model abstraction and backend implementations.
//!
//! Defines the [`ChatModel`] trait and its implementations:
//! - **[`MockModel`]**: fixed illustrative triplet; no I/O.
//! - **[`OpenAiChat`]**: cloud chat-completions endpoint with bearer auth.
//! - **[`OllamaChat`]**: local chat-style server (`/api/chat`).
//! - **[`TextGenChat`]**: local generate-style server (`/api/v1/generate`).
//! - **[`ModelRouter`]**: dispatches each call by the current
//!   [`RuntimeSelection`](crate::models::RuntimeSelection).
//!
//! # Error Handling
//!
//! Nothing here retries. Transport failures become
//! [`LlmError::Unreachable`] or [`LlmError::Timeout`], non-2xx responses
//! become [`LlmError::Upstream`] carrying the provider's error code and
//! message so the HTTP layer can classify quota exhaustion.

mod mock;
mod ollama;
mod openai;
mod textgen;

pub use mock::{MockModel, MOCK_RESPONSE};
pub use ollama::OllamaChat;
pub use openai::OpenAiChat;
pub use textgen::TextGenChat;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::BackendsConfig;
use crate::models::{ChatMessage, LocalEngine, Mode};
use crate::runtime::BackendSelector;

/// One model invocation.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Model hint; backends fall back to their configured model.
    pub model: Option<String>,
    pub max_tokens: u32,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no OpenAI API key configured")]
    NoCredential,

    #[error("unknown local backend: {0}")]
    UnknownLocalBackend(String),

    #[error("{backend} unreachable at {url}: {message}")]
    Unreachable {
        backend: &'static str,
        url: String,
        message: String,
    },

    #[error("{backend} request timed out after {secs}s")]
    Timeout { backend: &'static str, secs: u64 },

    #[error("{backend} API error {status}: {message}")]
    Upstream {
        backend: &'static str,
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("invalid {backend} response: {message}")]
    InvalidResponse {
        backend: &'static str,
        message: String,
    },
}

/// A backend that turns a message list into raw text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    async fn complete(&self, req: &CompletionRequest) -> Result<String, LlmError>;
}

/// Role-prefixed prompt for servers that take a single string:
/// `SYSTEM: ...`, `USER: ...` joined by blank lines.
pub fn flatten_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Status and body of a completed HTTP exchange.
pub(crate) struct HttpReply {
    pub status: reqwest::StatusCode,
    pub body: String,
}

/// POSTs `body` as JSON and reads the whole response as text.
pub(crate) async fn post_json<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    backend: &'static str,
    url: &str,
    bearer: Option<&str>,
    body: &B,
    timeout_secs: u64,
) -> Result<HttpReply, LlmError> {
    let mut request = client.post(url).json(body);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }

    let transport = |e: reqwest::Error| {
        if e.is_timeout() {
            LlmError::Timeout {
                backend,
                secs: timeout_secs,
            }
        } else {
            LlmError::Unreachable {
                backend,
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    };

    let response = request.send().await.map_err(transport)?;
    let status = response.status();
    let body = response.text().await.map_err(transport)?;
    Ok(HttpReply { status, body })
}

/// Builds an [`LlmError::Upstream`] from a non-2xx reply, lifting
/// `error.code` / `error.message` out of a JSON body when present.
pub(crate) fn upstream_error(backend: &'static str, reply: &HttpReply) -> LlmError {
    let json: Option<serde_json::Value> = serde_json::from_str(&reply.body).ok();
    let error = json.as_ref().and_then(|j| j.get("error"));

    let code = error
        .and_then(|e| e.get("code").or_else(|| e.get("type")))
        .and_then(|c| c.as_str())
        .map(str::to_string);
    let message = error
        .and_then(|e| e.get("message").and_then(|m| m.as_str()).or_else(|| e.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| reply.body.trim().to_string());

    LlmError::Upstream {
        backend,
        status: reply.status.as_u16(),
        code,
        message,
    }
}

/// Dispatches every call to the backend chosen by the shared
/// [`BackendSelector`]. Forced mock wins over the stored mode.
pub struct ModelRouter {
    selector: Arc<BackendSelector>,
    mock: MockModel,
    openai: OpenAiChat,
    ollama: OllamaChat,
    textgen: TextGenChat,
}

impl ModelRouter {
    pub fn new(config: &BackendsConfig, selector: Arc<BackendSelector>) -> Result<Self> {
        Ok(Self {
            selector,
            mock: MockModel,
            openai: OpenAiChat::new(&config.openai, config.timeout_secs)?,
            ollama: OllamaChat::new(&config.ollama, config.timeout_secs)?,
            textgen: TextGenChat::new(&config.textgen, config.timeout_secs)?,
        })
    }

    fn route(&self) -> Result<&dyn ChatModel, LlmError> {
        if self.selector.is_forced_mock() {
            return Ok(&self.mock);
        }
        let selection = self.selector.current();
        match selection.mode {
            Mode::Mock => Ok(&self.mock),
            Mode::Cloud => Ok(&self.openai),
            Mode::Local => match LocalEngine::parse(&selection.local_engine) {
                Some(LocalEngine::Ollama) => Ok(&self.ollama),
                Some(LocalEngine::TextGen) => Ok(&self.textgen),
                None => Err(LlmError::UnknownLocalBackend(selection.local_engine)),
            },
        }
    }
}

#[async_trait]
impl ChatModel for ModelRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<String, LlmError> {
        let backend = self.route()?;
        tracing::debug!(
            backend = backend.name(),
            messages = req.messages.len(),
            max_tokens = req.max_tokens,
            "model call"
        );
        backend.complete(req).await
    }
}
