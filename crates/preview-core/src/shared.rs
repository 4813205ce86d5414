//! Shared types used across the preview crates.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default session ID when the host does not supply one (single-workspace mode).
pub const DEFAULT_SESSION_ID: &str = "default";

/// Session context handed to remote collaborators with every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    /// Workspace session identifier.
    pub session_id: String,
    /// Correlation id of the surface request that caused this call, if any.
    pub correlation_id: Option<String>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            correlation_id: None,
        }
    }

    pub fn with_correlation(&self, correlation_id: impl Into<String>) -> Self {
        Self {
            session_id: self.session_id.clone(),
            correlation_id: Some(correlation_id.into()),
        }
    }

    /// Resolved session ID (never empty).
    pub fn resolved_session_id(&self) -> &str {
        if self.session_id.is_empty() {
            DEFAULT_SESSION_ID
        } else {
            &self.session_id
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_ID)
    }
}

/// Preview host configuration. Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Host identity shown in the status endpoint.
    pub app_name: String,
    /// HTTP port for the gateway.
    pub port: u16,
    /// Page generator mode ("mock" or "live").
    pub llm_mode: String,
    /// Intent executor mode ("mock" or "live").
    #[serde(default = "default_backend_mode")]
    pub backend_mode: String,
    /// Base URL of the remote intent executor when `backend_mode = "live"`.
    #[serde(default)]
    pub backend_url: Option<String>,
    /// Delay before a source change is re-bundled into the surface.
    pub render_debounce_ms: u64,
    /// Delay before buffer/tree changes propagate.
    pub sync_debounce_ms: u64,
    /// Bound on waiting for a surface command acknowledgment.
    pub command_timeout_ms: u64,
    /// Bound on a remote intent execution.
    pub intent_timeout_ms: u64,
    /// Maximum characters of existing styles sent with a page generation request.
    pub style_excerpt_chars: usize,
    /// External reference opened by `demo.*` intents.
    #[serde(default)]
    pub demo_url: Option<String>,
}

fn default_backend_mode() -> String {
    "mock".to_string()
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            app_name: "Preview Host".to_string(),
            port: 8010,
            llm_mode: "mock".to_string(),
            backend_mode: default_backend_mode(),
            backend_url: None,
            render_debounce_ms: 300,
            sync_debounce_ms: 300,
            command_timeout_ms: 1000,
            intent_timeout_ms: 15_000,
            style_excerpt_chars: 1500,
            demo_url: None,
        }
    }
}

impl PreviewConfig {
    pub fn render_debounce(&self) -> Duration {
        Duration::from_millis(self.render_debounce_ms)
    }

    pub fn sync_debounce(&self) -> Duration {
        Duration::from_millis(self.sync_debounce_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn intent_timeout(&self) -> Duration {
        Duration::from_millis(self.intent_timeout_ms)
    }

    /// Load config from file and environment. Precedence: env `PREVIEW_CONFIG` path > `config/preview.toml` > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("PREVIEW_CONFIG").unwrap_or_else(|_| "config/preview.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load config layering `path` (when it exists) and `PREVIEW__*` env vars over the defaults.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("app_name", defaults.app_name)?
            .set_default("port", defaults.port as i64)?
            .set_default("llm_mode", defaults.llm_mode)?
            .set_default("backend_mode", defaults.backend_mode)?
            .set_default("render_debounce_ms", defaults.render_debounce_ms as i64)?
            .set_default("sync_debounce_ms", defaults.sync_debounce_ms as i64)?
            .set_default("command_timeout_ms", defaults.command_timeout_ms as i64)?
            .set_default("intent_timeout_ms", defaults.intent_timeout_ms as i64)?
            .set_default("style_excerpt_chars", defaults.style_excerpt_chars as i64)?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("PREVIEW").separator("__"))
            .build()?;

        built.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = PreviewConfig::load_from(Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(cfg.render_debounce_ms, 300);
        assert_eq!(cfg.command_timeout(), Duration::from_millis(1000));
        assert_eq!(cfg.backend_mode, "mock");
        assert!(cfg.backend_url.is_none());
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "app_name = \"Builder Preview\"\ncommand_timeout_ms = 250\ndemo_url = \"https://example.com/demo\"").unwrap();
        let cfg = PreviewConfig::load_from(file.path()).unwrap();
        assert_eq!(cfg.app_name, "Builder Preview");
        assert_eq!(cfg.command_timeout_ms, 250);
        assert_eq!(cfg.demo_url.as_deref(), Some("https://example.com/demo"));
        assert_eq!(cfg.sync_debounce_ms, 300);
    }

    #[test]
    fn empty_session_id_resolves_to_default() {
        let ctx = SessionContext::new("");
        assert_eq!(ctx.resolved_session_id(), DEFAULT_SESSION_ID);
        let child = ctx.with_correlation("abc");
        assert_eq!(child.correlation_id.as_deref(), Some("abc"));
    }
}
