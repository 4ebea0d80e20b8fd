//! Process-wide backend selection.
//!
//! [`BackendSelector`] is shared (`Arc`) between the HTTP handlers, the
//! model router and the CLI. The stored selection is behind an `RwLock`;
//! the forced-mock flag and cloud credential presence are fixed at startup.
//! Forced mock never rewrites the stored mode; it is applied when a call is
//! dispatched.

use std::sync::{PoisonError, RwLock};
use thiserror::Error;

use crate::config::BackendsConfig;
use crate::models::{BackendOption, LocalEngine, Mode, RuntimeSelection};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("mode is required")]
    MissingMode,
    #[error("invalid mode: {0}")]
    InvalidMode(String),
}

pub struct BackendSelector {
    selection: RwLock<RuntimeSelection>,
    force_mock: bool,
    cloud_configured: bool,
    ollama_url: String,
    textgen_url: String,
}

impl BackendSelector {
    pub fn new(backends: &BackendsConfig) -> Self {
        let cloud_configured = backends.openai.has_credential();
        let mode = if backends.force_mock {
            Mode::Mock
        } else if cloud_configured {
            Mode::Cloud
        } else {
            Mode::Mock
        };

        Self {
            selection: RwLock::new(RuntimeSelection {
                mode,
                local_engine: backends.local_engine.clone(),
            }),
            force_mock: backends.force_mock,
            cloud_configured,
            ollama_url: backends.ollama.url.clone(),
            textgen_url: backends.textgen.url.clone(),
        }
    }

    /// Mock always, cloud only with a credential, both local engines always
    /// (reachability is not probed).
    pub fn available_options(&self) -> Vec<BackendOption> {
        let mut opts = vec![BackendOption {
            id: "mock".to_string(),
            label: "Mock (no-cost, dev only)".to_string(),
        }];
        if self.cloud_configured {
            opts.push(BackendOption {
                id: "openai".to_string(),
                label: "OpenAI (cloud)".to_string(),
            });
        }
        for engine in LocalEngine::ALL {
            let (name, url) = match engine {
                LocalEngine::Ollama => ("Ollama", &self.ollama_url),
                LocalEngine::TextGen => ("Text-Generation-WebUI", &self.textgen_url),
            };
            opts.push(BackendOption {
                id: format!("local:{}", engine.as_str()),
                label: format!("Local: {} ({})", name, url),
            });
        }
        opts
    }

    /// Overwrites the stored selection and returns it.
    ///
    /// `mode` may also be an option id of the form `local:<engine>`, which
    /// selects local mode and that engine. An explicit `local_engine` wins
    /// over one embedded in the mode. Blank engine names leave the stored
    /// engine unchanged.
    pub fn select(
        &self,
        mode: Option<&str>,
        local_engine: Option<&str>,
    ) -> Result<RuntimeSelection, SelectError> {
        let raw = mode
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or(SelectError::MissingMode)?;

        let (mode_name, embedded_engine) = match raw.split_once(':') {
            Some((m, engine)) => (m, Some(engine)),
            None => (raw, None),
        };
        let mode = match Mode::parse(mode_name) {
            Some(Mode::Local) => Mode::Local,
            Some(other) if embedded_engine.is_none() => other,
            _ => return Err(SelectError::InvalidMode(raw.to_string())),
        };

        let engine = local_engine
            .or(embedded_engine)
            .map(str::trim)
            .filter(|e| !e.is_empty());

        let mut guard = self
            .selection
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.mode = mode;
        if let Some(engine) = engine {
            guard.local_engine = engine.to_string();
        }
        tracing::info!(mode = %guard.mode, local_engine = %guard.local_engine, "backend selected");
        Ok(guard.clone())
    }

    pub fn current(&self) -> RuntimeSelection {
        self.selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_forced_mock(&self) -> bool {
        self.force_mock
    }

    pub fn cloud_configured(&self) -> bool {
        self.cloud_configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backends(force_mock: bool, key: Option<&str>) -> BackendsConfig {
        let mut cfg = BackendsConfig::default();
        cfg.force_mock = force_mock;
        cfg.openai.api_key = key.map(str::to_string);
        cfg
    }

    #[test]
    fn initial_mode_prefers_cloud_with_credential() {
        let sel = BackendSelector::new(&backends(false, Some("sk-test")));
        assert_eq!(sel.current().mode, Mode::Cloud);
        assert_eq!(sel.current().local_engine, "ollama");
    }

    #[test]
    fn initial_mode_mock_without_credential_or_when_forced() {
        assert_eq!(BackendSelector::new(&backends(false, None)).current().mode, Mode::Mock);
        let forced = BackendSelector::new(&backends(true, Some("sk-test")));
        assert_eq!(forced.current().mode, Mode::Mock);
        assert!(forced.is_forced_mock());
    }

    #[test]
    fn options_hide_cloud_without_credential() {
        let ids: Vec<String> = BackendSelector::new(&backends(false, None))
            .available_options()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec!["mock", "local:ollama", "local:textgen"]);
    }

    #[test]
    fn options_include_cloud_with_credential() {
        let opts = BackendSelector::new(&backends(false, Some("sk"))).available_options();
        assert_eq!(opts[1].id, "openai");
        assert_eq!(opts.len(), 4);
        assert!(opts[2].label.contains("http://localhost:11434"));
    }

    #[test]
    fn select_rejects_missing_and_invalid() {
        let sel = BackendSelector::new(&backends(false, None));
        assert_eq!(sel.select(None, None), Err(SelectError::MissingMode));
        assert_eq!(sel.select(Some("  "), None), Err(SelectError::MissingMode));
        assert!(matches!(
            sel.select(Some("invalid"), None),
            Err(SelectError::InvalidMode(_))
        ));
        assert!(matches!(
            sel.select(Some("mock:ollama"), None),
            Err(SelectError::InvalidMode(_))
        ));
        assert_eq!(sel.current().mode, Mode::Mock);
    }

    #[test]
    fn select_engine_is_optional_and_independent() {
        let sel = BackendSelector::new(&backends(false, None));
        let s = sel.select(Some("local"), Some("textgen")).unwrap();
        assert_eq!(s.mode, Mode::Local);
        assert_eq!(s.local_engine, "textgen");

        let s = sel.select(Some("mock"), None).unwrap();
        assert_eq!(s.mode, Mode::Mock);
        assert_eq!(s.local_engine, "textgen");
    }

    #[test]
    fn select_accepts_option_ids() {
        let sel = BackendSelector::new(&backends(false, None));
        let s = sel.select(Some("local:textgen"), None).unwrap();
        assert_eq!(s.mode, Mode::Local);
        assert_eq!(s.local_engine, "textgen");
    }

    #[test]
    fn unknown_engine_is_stored() {
        let sel = BackendSelector::new(&backends(false, None));
        let s = sel.select(Some("local"), Some("vllm")).unwrap();
        assert_eq!(s.local_engine, "vllm");
    }

    #[test]
    fn forced_mock_does_not_rewrite_selection() {
        let sel = BackendSelector::new(&backends(true, None));
        let s = sel.select(Some("openai"), None).unwrap();
        assert_eq!(s.mode, Mode::Cloud);
        assert!(sel.is_forced_mock());
    }
}
