//! Cloud chat-completions backend.
//!
//! Calls `POST {base_url}/chat/completions` with bearer auth and a fixed low
//! temperature. All non-empty `choices[].message.content` values are joined
//! with blank lines.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use super::{http_client, post_json, upstream_error, ChatModel, CompletionRequest, LlmError};
use crate::config::OpenAiConfig;
use crate::models::ChatMessage;

const BACKEND: &str = "openai";

pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(config: &OpenAiConfig, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key: config
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty()),
            timeout_secs,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::NoCredential)?;

        let body = ChatRequest {
            model: req.model.as_deref().unwrap_or(&self.model),
            messages: &req.messages,
            max_tokens: req.max_tokens,
            temperature: self.temperature,
        };
        let url = format!("{}/chat/completions", self.base_url);

        let reply = post_json(
            &self.client,
            BACKEND,
            &url,
            Some(api_key),
            &body,
            self.timeout_secs,
        )
        .await?;

        if !reply.status.is_success() {
            return Err(upstream_error(BACKEND, &reply));
        }

        let json: serde_json::Value =
            serde_json::from_str(&reply.body).map_err(|e| LlmError::InvalidResponse {
                backend: BACKEND,
                message: e.to_string(),
            })?;
        Ok(parse_chat_response(&json))
    }
}

fn parse_chat_response(json: &serde_json::Value) -> String {
    json.get("choices")
        .and_then(|c| c.as_array())
        .map(|choices| {
            choices
                .iter()
                .filter_map(|c| c.pointer("/message/content").and_then(|t| t.as_str()))
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_non_empty_choices() {
        let body = json!({
            "choices": [
                {"message": {"content": "first"}},
                {"message": {"content": ""}},
                {"message": {"role": "assistant"}},
                {"message": {"content": "second"}}
            ]
        });
        assert_eq!(parse_chat_response(&body), "first\n\nsecond");
    }

    #[test]
    fn missing_choices_is_empty() {
        assert_eq!(parse_chat_response(&json!({"id": "x"})), "");
    }

    #[test]
    fn request_body_shape() {
        let messages = vec![ChatMessage::system("s"), ChatMessage::user("u")];
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            max_tokens: 900,
            temperature: 0.15,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["model"], "gpt-4o-mini");
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["content"], "u");
        assert_eq!(v["max_tokens"], 900);
    }

    #[tokio::test]
    async fn no_key_is_no_credential() {
        let chat = OpenAiChat::new(&OpenAiConfig::default(), 5).unwrap();
        let req = CompletionRequest {
            messages: vec![ChatMessage::user("u")],
            model: None,
            max_tokens: 1,
        };
        assert!(matches!(chat.complete(&req).await, Err(LlmError::NoCredential)));
    }
}
