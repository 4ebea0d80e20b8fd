//! HTTP API for SOW analysis.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/llm-options` | Selectable backends and the current selection |
//! | `POST` | `/llm-select` | Change the backend: `{mode, localEngine?}` |
//! | `POST` | `/analyze` | Multipart `file` (or `text`) field, or JSON `{text}` |
//! | `GET`  | `/api/health` | Health check (also served at `/health`) |
//!
//! # Responses
//!
//! A finished analysis answers `200` with
//! `{ok:true, mode, chunks, analysis:{risks,unclear,remediation}, rawParts:[{i,raw}]}`.
//! When the combined model output is not parseable the status is still
//! `200`, with `{ok:false, parseError, combinedRaw, parts:[{chunkIndex,raw}]}`
//! so the raw outputs reach the caller. Every other failure follows the
//! contract in [`crate::error`].
//!
//! # Uploads
//!
//! Files are written to `[server].upload_dir` under a random name and
//! removed as soon as their text is extracted; a guard removes them on every
//! other exit path too.

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::analysis::{AnalyzeError, Analyzer};
use crate::config::Config;
use crate::error::ApiError;
use crate::extract::extract_upload;
use crate::llm::ModelRouter;
use crate::models::{
    AnalysisOutcome, AnalysisVerdict, BackendOption, ChunkResult, RuntimeSelection,
    UploadedDocument,
};
use crate::runtime::BackendSelector;

/// Registered routes, logged at startup.
pub const ROUTES: &[(&str, &str)] = &[
    ("GET", "/llm-options"),
    ("POST", "/llm-select"),
    ("POST", "/analyze"),
    ("GET", "/api/health"),
    ("GET", "/health"),
];

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub selector: Arc<BackendSelector>,
    pub analyzer: Arc<Analyzer>,
}

impl AppState {
    /// Wires the selector, the model router and the analyzer from `config`.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let selector = Arc::new(BackendSelector::new(&config.backends));
        let router = ModelRouter::new(&config.backends, selector.clone())
            .context("Failed to build model backends")?;
        let analyzer = Analyzer::new(Arc::new(router), selector.clone(), config.analysis.clone());
        Ok(Self {
            config: Arc::new(config.clone()),
            selector,
            analyzer: Arc::new(analyzer),
        })
    }
}

/// Builds the router with CORS, request tracing and the upload size limit.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/llm-options", get(handle_options))
        .route("/llm-select", post(handle_select))
        .route("/analyze", post(handle_analyze))
        .route("/api/health", get(handle_health))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Binds `[server].bind` and serves until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.server.upload_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create upload dir: {}",
                config.server.upload_dir.display()
            )
        })?;

    let state = AppState::new(config)?;
    let current = state.selector.current();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        mode = %current.mode,
        local_engine = %current.local_engine,
        force_mock = config.backends.force_mock,
        "SOW analyzer listening"
    );
    for (method, path) in ROUTES {
        tracing::info!("route {} {}", method, path);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown requested");
    }
}

// ============ GET /api/health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET /llm-options ============

#[derive(Serialize)]
struct OptionsResponse {
    ok: bool,
    options: Vec<BackendOption>,
    current: RuntimeSelection,
}

async fn handle_options(State(state): State<AppState>) -> Json<OptionsResponse> {
    Json(OptionsResponse {
        ok: true,
        options: state.selector.available_options(),
        current: state.selector.current(),
    })
}

// ============ POST /llm-select ============

#[derive(Serialize)]
struct SelectResponse {
    ok: bool,
    selected: RuntimeSelection,
}

/// Reads the body leniently: a missing or non-JSON body has no mode.
async fn handle_select(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SelectResponse>, ApiError> {
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();

    let mode = string_field(&json, "mode");
    let engine = string_field(&json, "localEngine").or_else(|| string_field(&json, "localBackend"));

    let selected = state.selector.select(mode.as_deref(), engine.as_deref())?;
    Ok(Json(SelectResponse { ok: true, selected }))
}

/// Strings as-is, other non-null scalars as their JSON text.
fn string_field(json: &serde_json::Value, key: &str) -> Option<String> {
    match json.get(key)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ============ POST /analyze ============

/// Wire body of `POST /analyze`. Both shapes are sent with status 200.
#[derive(Serialize)]
#[serde(untagged)]
pub enum AnalyzeBody {
    #[serde(rename_all = "camelCase")]
    Complete {
        ok: bool,
        mode: RuntimeSelection,
        chunks: usize,
        analysis: AnalysisVerdict,
        raw_parts: Vec<RawPart>,
    },
    #[serde(rename_all = "camelCase")]
    ParseFailure {
        ok: bool,
        parse_error: String,
        combined_raw: String,
        parts: Vec<ChunkResult>,
    },
}

#[derive(Serialize)]
pub struct RawPart {
    pub i: usize,
    pub raw: String,
}

impl From<AnalysisOutcome> for AnalyzeBody {
    fn from(outcome: AnalysisOutcome) -> Self {
        match outcome {
            AnalysisOutcome::Complete {
                selection,
                chunks,
                analysis,
                raw_parts,
            } => AnalyzeBody::Complete {
                ok: true,
                mode: selection,
                chunks,
                analysis,
                raw_parts: raw_parts
                    .into_iter()
                    .map(|p| RawPart {
                        i: p.chunk_index,
                        raw: p.raw,
                    })
                    .collect(),
            },
            AnalysisOutcome::ParseFailure {
                parse_error,
                combined_raw,
                parts,
            } => AnalyzeBody::ParseFailure {
                ok: false,
                parse_error,
                combined_raw,
                parts,
            },
        }
    }
}

/// Owns a stored upload until it is deleted.
///
/// The handler calls [`UploadGuard::remove`]. A guard dropped without it
/// (cancelled request, error while reading the rest of the form) hands the
/// deletion to a spawned task.
struct UploadGuard {
    doc: UploadedDocument,
    removed: bool,
}

impl UploadGuard {
    async fn remove(mut self) {
        self.removed = true;
        remove_upload(&self.doc.path).await;
    }
}

async fn remove_upload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "upload removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove upload"),
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        let path = std::mem::take(&mut self.doc.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { remove_upload(&path).await });
            }
            // no runtime left to block
            Err(_) => {
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove upload");
                }
            }
        }
    }
}

enum AnalyzeInput {
    Upload(UploadGuard),
    Text(String),
    Nothing,
}

async fn handle_analyze(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<AnalyzeBody>, ApiError> {
    let input = read_analyze_input(&state, request).await?;

    let text = match input {
        AnalyzeInput::Upload(guard) => {
            tracing::info!(file = %guard.doc.original_name, "analysing upload");
            let text = extract_upload(&guard.doc, &state.config.extract).await;
            guard.remove().await;
            text.map_err(AnalyzeError::from)?
        }
        AnalyzeInput::Text(text) => text,
        AnalyzeInput::Nothing => return Err(AnalyzeError::NoInput.into()),
    };

    let outcome = state.analyzer.analyze(&text).await.map_err(|e| {
        tracing::error!(error = %e, "analysis failed");
        ApiError::from(e)
    })?;

    Ok(Json(AnalyzeBody::from(outcome)))
}

async fn read_analyze_input(state: &AppState, request: Request) -> Result<AnalyzeInput, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, "invalid_request", e.body_text()))?;
        return read_multipart(multipart, &state.config.server.upload_dir).await;
    }

    let body = Bytes::from_request(request, state)
        .await
        .map_err(|e| ApiError::new(e.status(), "invalid_request", e.body_text()))?;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
    Ok(match json.get("text").and_then(|t| t.as_str()) {
        Some(text) if !text.is_empty() => AnalyzeInput::Text(text.to_string()),
        _ => AnalyzeInput::Nothing,
    })
}

/// The first `file` field wins over any `text` field.
async fn read_multipart(mut multipart: Multipart, upload_dir: &Path) -> Result<AnalyzeInput, ApiError> {
    let mut upload: Option<UploadGuard> = None;
    let mut text: Option<String> = None;

    let bad_multipart =
        |e: axum::extract::multipart::MultipartError| ApiError::new(e.status(), "invalid_request", e.body_text());

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") if upload.is_none() => {
                let original_name = field.file_name().unwrap_or("").to_string();
                let data = field.bytes().await.map_err(bad_multipart)?;
                upload = Some(save_upload(upload_dir, &original_name, &data).await?);
            }
            Some("text") => {
                let value = field.text().await.map_err(bad_multipart)?;
                if !value.is_empty() {
                    text = Some(value);
                }
            }
            _ => {}
        }
    }

    Ok(match (upload, text) {
        (Some(guard), _) => AnalyzeInput::Upload(guard),
        (None, Some(text)) => AnalyzeInput::Text(text),
        (None, None) => AnalyzeInput::Nothing,
    })
}

async fn save_upload(
    upload_dir: &Path,
    original_name: &str,
    data: &[u8],
) -> Result<UploadGuard, ApiError> {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    let path: PathBuf = upload_dir.join(format!("{}{}", uuid::Uuid::new_v4(), ext));

    let write = async {
        tokio::fs::create_dir_all(upload_dir).await?;
        tokio::fs::write(&path, data).await
    };
    if let Err(e) = write.await {
        tracing::error!(path = %path.display(), error = %e, "failed to store upload");
        return Err(ApiError::processing_failed(format!("Failed to store upload: {}", e)));
    }

    Ok(UploadGuard {
        doc: UploadedDocument {
            path,
            original_name: original_name.to_string(),
        },
        removed: false,
    })
}
