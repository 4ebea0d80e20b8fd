//! Local generate-style backend (text-generation-webui).

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use super::{
    flatten_messages, http_client, post_json, upstream_error, ChatModel, CompletionRequest,
    LlmError,
};
use crate::config::TextGenConfig;

const BACKEND: &str = "textgen";

pub struct TextGenChat {
    client: reqwest::Client,
    url: String,
    model: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    input: &'a str,
    prompt: &'a str,
    max_new_tokens: u32,
}

impl TextGenChat {
    pub fn new(config: &TextGenConfig, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs,
        })
    }
}

#[async_trait]
impl ChatModel for TextGenChat {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<String, LlmError> {
        let prompt = flatten_messages(&req.messages);
        let body = GenerateRequest {
            model: req.model.as_deref().unwrap_or(&self.model),
            input: &prompt,
            prompt: &prompt,
            max_new_tokens: req.max_tokens,
        };
        let url = format!("{}/api/v1/generate", self.url);

        let reply = post_json(&self.client, BACKEND, &url, None, &body, self.timeout_secs).await?;
        if !reply.status.is_success() {
            return Err(upstream_error(BACKEND, &reply));
        }
        Ok(extract_generated_text(&reply.body))
    }
}

/// `results[0].generated_text`, then `results[0].text`, else the raw body.
fn extract_generated_text(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    ["/results/0/generated_text", "/results/0/text"]
        .iter()
        .filter_map(|p| json.pointer(p).and_then(|v| v.as_str()))
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| json.to_string())
}
