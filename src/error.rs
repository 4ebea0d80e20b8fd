//! HTTP error contract.
//!
//! Every failure is answered with
//!
//! ```json
//! { "ok": false, "error": "<tag>", "message": "<human readable>" }
//! ```
//!
//! | Source | Status | Tag |
//! |--------|--------|-----|
//! | no file and no text | 400 | `no_input` |
//! | blank document | 400 | `empty_document` |
//! | missing / unknown mode | 400 | `missing_mode` / `invalid_mode` |
//! | provider quota exhausted | 402 | `quota_exceeded` |
//! | backend unreachable | 502 | `backend_unreachable` |
//! | other upstream non-2xx | upstream status | `processing_failed` |
//! | anything else | 500 | `processing_failed` |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::analysis::AnalyzeError;
use crate::extract::ExtractError;
use crate::llm::LlmError;
use crate::runtime::SelectError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    ok: bool,
    error: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    pub fn processing_failed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "processing_failed", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            ok: false,
            error: self.error,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SelectError> for ApiError {
    fn from(err: SelectError) -> Self {
        let tag = match err {
            SelectError::MissingMode => "missing_mode",
            SelectError::InvalidMode(_) => "invalid_mode",
        };
        ApiError::new(StatusCode::BAD_REQUEST, tag, err.to_string())
    }
}

impl From<AnalyzeError> for ApiError {
    fn from(err: AnalyzeError) -> Self {
        match err {
            AnalyzeError::NoInput => ApiError::new(StatusCode::BAD_REQUEST, "no_input", err.to_string()),
            AnalyzeError::EmptyDocument => {
                ApiError::new(StatusCode::BAD_REQUEST, "empty_document", err.to_string())
            }
            AnalyzeError::Extract(e) => e.into(),
            AnalyzeError::Llm(e) => e.into(),
        }
    }
}

impl From<ExtractError> for ApiError {
    fn from(err: ExtractError) -> Self {
        ApiError::processing_failed(err.to_string())
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        if is_quota_error(&err) {
            return ApiError::new(
                StatusCode::PAYMENT_REQUIRED,
                "quota_exceeded",
                format!("Provider quota exhausted: {}", err),
            );
        }
        match &err {
            LlmError::Unreachable { .. } => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "backend_unreachable",
                format!("Selected LLM backend unreachable: {}", err),
            ),
            LlmError::Upstream { status, .. } => {
                let status = StatusCode::from_u16(*status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                ApiError::new(status, "processing_failed", err.to_string())
            }
            _ => ApiError::processing_failed(err.to_string()),
        }
    }
}

/// Quota signals: the provider's `insufficient_quota` code, or "quota" /
/// "insufficient" anywhere in its message.
fn is_quota_error(err: &LlmError) -> bool {
    match err {
        LlmError::Upstream { code, message, .. } => {
            let message = message.to_ascii_lowercase();
            code.as_deref() == Some("insufficient_quota")
                || message.contains("quota")
                || message.contains("insufficient")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(status: u16, code: Option<&str>, message: &str) -> LlmError {
        LlmError::Upstream {
            backend: "openai",
            status,
            code: code.map(str::to_string),
            message: message.to_string(),
        }
    }

    #[test]
    fn quota_code_maps_to_402() {
        let e: ApiError = upstream(429, Some("insufficient_quota"), "rate").into();
        assert_eq!(e.status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(e.error, "quota_exceeded");
    }

    #[test]
    fn quota_message_maps_to_402() {
        let e: ApiError = upstream(403, None, "Insufficient balance on account").into();
        assert_eq!(e.status, StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn upstream_status_passed_through() {
        let e: ApiError = upstream(404, Some("model_not_found"), "no such model").into();
        assert_eq!(e.status, StatusCode::NOT_FOUND);
        assert_eq!(e.error, "processing_failed");
    }

    #[test]
    fn unreachable_maps_to_502() {
        let e: ApiError = LlmError::Unreachable {
            backend: "ollama",
            url: "http://localhost:11434/api/chat".to_string(),
            message: "connection refused".to_string(),
        }
        .into();
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);
        assert_eq!(e.error, "backend_unreachable");
    }

    #[test]
    fn configuration_errors_are_500() {
        let e: ApiError = LlmError::NoCredential.into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        let e: ApiError = LlmError::UnknownLocalBackend("vllm".into()).into();
        assert_eq!(e.error, "processing_failed");
    }

    #[test]
    fn unsupported_format_is_processing_failure() {
        let e: ApiError = AnalyzeError::Extract(ExtractError::Unsupported("bin".into())).into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.error, "processing_failed");
        assert!(e.message.contains("bin"));
    }

    #[test]
    fn input_errors_are_400() {
        let e: ApiError = AnalyzeError::NoInput.into();
        assert_eq!((e.status, e.error), (StatusCode::BAD_REQUEST, "no_input"));
        let e: ApiError = SelectError::InvalidMode("x".into()).into();
        assert_eq!(e.error, "invalid_mode");
    }
}
