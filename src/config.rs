//! Relay configuration loading and validation.
//!
//! Reads `chat-droid.yaml` and resolves environment variables. Every field has
//! a built-in default, so a missing file or a partial file is fine.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// File name searched for when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "chat-droid.yaml";

/// Env var that points at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "CHAT_DROID_CONFIG";

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Configuration loading or validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── RelayConfig ─────────────────────────────────────────────────────────────

/// Values the conversation core consumes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Full URL of the generate endpoint.
    pub endpoint_url: String,
    /// Model used when a request names none or names one not allowed.
    pub default_model: String,
    /// Models a request may select.
    pub allowed_models: Vec<String>,
    /// Temperature used when a request supplies none or an invalid one.
    pub default_temperature: f32,
    /// Total time budget for one inference call.
    pub request_timeout_secs: u64,
    /// Model-name prefixes whose output carries `<think>` markup.
    pub reasoning_model_prefixes: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:11434/api/generate".to_string(),
            default_model: "deepseek-r1:8b".to_string(),
            allowed_models: vec![
                "deepseek-r1:8b".to_string(),
                "deepseek-r1:14b".to_string(),
                "llama3.1:8b".to_string(),
                "mistral:7b".to_string(),
            ],
            default_temperature: 0.7,
            request_timeout_secs: 30,
            reasoning_model_prefixes: vec!["deepseek-r1".to_string()],
        }
    }
}

impl RelayConfig {
    /// Whether `model` is on the allow-list.
    pub fn is_allowed_model(&self, model: &str) -> bool {
        self.allowed_models.iter().any(|m| m == model)
    }

    /// Whether `model` belongs to a reasoning family (prefix match).
    pub fn is_reasoning_model(&self, model: &str) -> bool {
        self.reasoning_model_prefixes
            .iter()
            .any(|prefix| model.starts_with(prefix.as_str()))
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_models.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "allowed_models must not be empty".into(),
            });
        }
        if !self.is_allowed_model(&self.default_model) {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "default_model '{}' is not in allowed_models",
                    self.default_model
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.default_temperature) {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "default_temperature {} is outside 0.0-1.0",
                    self.default_temperature
                ),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "request_timeout_secs must be greater than zero".into(),
            });
        }
        reqwest::Url::parse(&self.endpoint_url).map_err(|e| ConfigError::Invalid {
            reason: format!("endpoint_url '{}': {e}", self.endpoint_url),
        })?;
        Ok(())
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `CHAT_DROID_CONFIG` first, then walks upward from `start` looking
/// for `chat-droid.yaml`. Returns `None` when neither is found.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(path);
        if candidate.exists() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_ENV_VAR} points at a missing file");
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Load, interpolate, parse and validate a config file.
///
/// String values may use `${VAR_NAME}` or `${VAR_NAME:-default}`.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    parse_config(&raw)
}

/// Parse config text (after env interpolation) and validate it.
pub fn parse_config(raw: &str) -> Result<RelayConfig, ConfigError> {
    let interpolated = interpolate_env_vars(raw);

    // An empty document deserializes to unit, not a map.
    let config: RelayConfig = if interpolated.trim().is_empty() {
        RelayConfig::default()
    } else {
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?
    };

    config.validate()?;
    Ok(config)
}

/// Resolve the effective configuration.
///
/// An explicit path must exist. Otherwise the searched file is used when
/// found, and built-in defaults when not.
pub fn resolve_config(explicit: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    let cwd = std::env::current_dir().unwrap_or_default();
    match find_config_path(&cwd) {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading relay config");
            load_config(&path)
        }
        None => {
            tracing::info!("no {CONFIG_FILE_NAME} found, using built-in defaults");
            Ok(RelayConfig::default())
        }
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
