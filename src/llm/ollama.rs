//! Local chat-style backend (Ollama).
//!
//! Response shapes differ between server versions, so the text is taken from
//! the first of `output[0].content`, `message.content`, `text`, falling back
//! to the raw response body.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use super::{
    flatten_messages, http_client, post_json, upstream_error, ChatModel, CompletionRequest,
    LlmError,
};
use crate::config::OllamaConfig;
use crate::models::ChatMessage;

const BACKEND: &str = "ollama";

pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    stream: bool,
}

impl OllamaChat {
    pub fn new(config: &OllamaConfig, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<String, LlmError> {
        let body = OllamaRequest {
            model: req.model.as_deref().unwrap_or(&self.model),
            prompt: flatten_messages(&req.messages),
            messages: &req.messages,
            max_tokens: req.max_tokens,
            stream: false,
        };
        let url = format!("{}/api/chat", self.url);

        let reply = post_json(&self.client, BACKEND, &url, None, &body, self.timeout_secs).await?;
        if !reply.status.is_success() {
            return Err(upstream_error(BACKEND, &reply));
        }
        Ok(extract_ollama_text(&reply.body))
    }
}

fn extract_ollama_text(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    ["/output/0/content", "/message/content", "/text"]
        .iter()
        .filter_map(|p| json.pointer(p).and_then(|v| v.as_str()))
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| json.to_string())
}
