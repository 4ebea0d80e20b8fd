//! TOML configuration with environment overrides.
//!
//! Every field has a default, so the service runs without any file at all.
//! Environment variables are applied once, after the file is parsed:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `OPENAI_API_KEY` | Cloud credential; enables the `openai` backend |
//! | `USE_MOCK` | `true` forces every model call onto the mock backend |
//! | `PORT` | Replaces the port of `server.bind` |
//! | `ALLOWED_ORIGINS` | Comma-separated CORS allow-list |
//!
//! The binary loads a `.env` file with `dotenvy` before reading the
//! environment; variables already set in the process take precedence.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Empty means any origin is allowed.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            upload_dir: default_upload_dir(),
            allowed_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}
fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}
fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

/// Knobs of the chunk-then-combine analysis.
#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_chunk_max_tokens")]
    pub chunk_max_tokens: usize,
    #[serde(default = "default_chunk_items_max")]
    pub chunk_items_max: usize,
    #[serde(default = "default_combined_items_max")]
    pub combined_items_max: usize,
    #[serde(default = "default_chunk_output_tokens")]
    pub chunk_output_tokens: u32,
    #[serde(default = "default_combine_output_tokens")]
    pub combine_output_tokens: u32,
    /// Model hint forwarded with every call. Backends use their own default when unset.
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            chunk_max_tokens: default_chunk_max_tokens(),
            chunk_items_max: default_chunk_items_max(),
            combined_items_max: default_combined_items_max(),
            chunk_output_tokens: default_chunk_output_tokens(),
            combine_output_tokens: default_combine_output_tokens(),
            model: None,
        }
    }
}

fn default_chunk_max_tokens() -> usize {
    crate::analysis::CHUNK_MAX_TOKENS
}
fn default_chunk_items_max() -> usize {
    crate::analysis::CHUNK_ITEMS_MAX
}
fn default_combined_items_max() -> usize {
    crate::analysis::COMBINED_ITEMS_MAX
}
fn default_chunk_output_tokens() -> u32 {
    900
}
fn default_combine_output_tokens() -> u32 {
    800
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendsConfig {
    #[serde(default)]
    pub force_mock: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Local engine used when the runtime mode is `local`.
    #[serde(default = "default_local_engine")]
    pub local_engine: String,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub textgen: TextGenConfig,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            force_mock: false,
            timeout_secs: default_timeout_secs(),
            local_engine: default_local_engine(),
            openai: OpenAiConfig::default(),
            ollama: OllamaConfig::default(),
            textgen: TextGenConfig::default(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}
fn default_local_engine() -> String {
    "ollama".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Filled from `OPENAI_API_KEY`; never read from the file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            temperature: default_temperature(),
            api_key: None,
        }
    }
}

impl OpenAiConfig {
    pub fn has_credential(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.15
}

/// `[backends.ollama]`. Missing keys keep the Ollama defaults.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            model: "llama2".to_string(),
        }
    }
}

/// `[backends.textgen]`. Missing keys keep the Text-Generation-WebUI defaults.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TextGenConfig {
    pub url: String,
    pub model: String,
}

impl Default for TextGenConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7860".to_string(),
            model: "gptq-model".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    /// Office converter used for `.doc` to `.docx`.
    #[serde(default = "default_office_converter")]
    pub office_converter: String,
    #[serde(default = "default_convert_timeout_secs")]
    pub convert_timeout_secs: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            office_converter: default_office_converter(),
            convert_timeout_secs: default_convert_timeout_secs(),
        }
    }
}

fn default_office_converter() -> String {
    "soffice".to_string()
}
fn default_convert_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "info,sow_analyzer=debug,tower_http=info".to_string()
}

impl Config {
    /// Defaults plus environment overrides, for running without a config file.
    pub fn from_env_only() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies the environment overrides through `lookup` so tests can inject values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.backends.openai.api_key = Some(key);
        }
        if let Some(flag) = lookup("USE_MOCK") {
            self.backends.force_mock = flag.trim().eq_ignore_ascii_case("true");
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.trim().parse::<u16>().ok()) {
            let host = self
                .server
                .bind
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.server.bind = format!("{}:{}", host, port);
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.analysis.chunk_max_tokens == 0 {
            bail!("analysis.chunk_max_tokens must be > 0");
        }
        if self.analysis.chunk_items_max == 0 || self.analysis.combined_items_max == 0 {
            bail!("analysis item caps must be > 0");
        }
        if self.backends.timeout_secs == 0 {
            bail!("backends.timeout_secs must be > 0");
        }
        if self.extract.convert_timeout_secs == 0 {
            bail!("extract.convert_timeout_secs must be > 0");
        }
        if self.backends.local_engine.trim().is_empty() {
            bail!("backends.local_engine must not be empty");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;

    Ok(config)
}
