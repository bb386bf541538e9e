//! Configuration loading, validation, and management for oxpilot.
//!
//! Loads configuration from `~/.oxpilot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The kind of backend a provider speaks natively.
///
/// Every provider is tried through the OpenAI-compatible surface first; the
/// kind selects which native endpoint to fall back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Ollama,
}

/// Configuration for a single LLM provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub kind: ProviderKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub base_url: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// Default provider/model selection and generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "llama3.2:latest".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// The root configuration structure.
///
/// Maps directly to `~/.oxpilot/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configured providers, keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Default provider/model selection.
    #[serde(default)]
    pub defaults: Defaults,

    /// Commands the terminal tool may run. Empty = allow all.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
}

fn default_allowed_commands() -> Vec<String> {
    vec![
        "ls".into(),
        "cat".into(),
        "head".into(),
        "tail".into(),
        "echo".into(),
        "pwd".into(),
        "wc".into(),
        "grep".into(),
        "find".into(),
        "git".into(),
        "cargo".into(),
        "rustc".into(),
        "go".into(),
        "gofmt".into(),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderConfig {
                kind: ProviderKind::OpenAi,
                api_key: None,
                base_url: "https://api.openai.com".into(),
            },
        );
        providers.insert(
            "ollama".to_string(),
            ProviderConfig {
                kind: ProviderKind::Ollama,
                api_key: None,
                base_url: "http://localhost:11434".into(),
            },
        );

        Self {
            providers,
            defaults: Defaults::default(),
            allowed_commands: default_allowed_commands(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (`~/.oxpilot/config.toml`).
    ///
    /// Environment variable overrides (highest priority):
    /// - `OXPILOT_API_KEY` / `OPENAI_API_KEY` — API key for the default provider
    /// - `OXPILOT_PROVIDER` — default provider name
    /// - `OXPILOT_MODEL` — default model
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Some(key) = std::env::var("OXPILOT_API_KEY")
            .ok()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        {
            let default = config.defaults.provider.clone();
            if let Some(provider) = config.providers.get_mut(&default)
                && provider.api_key.is_none()
            {
                provider.api_key = Some(key);
            }
        }

        if let Ok(provider) = std::env::var("OXPILOT_PROVIDER") {
            config.defaults.provider = provider;
        }

        if let Ok(model) = std::env::var("OXPILOT_MODEL") {
            config.defaults.model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Write this configuration to `path` as pretty TOML.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".oxpilot")
    }

    /// Resolve the configured default provider.
    pub fn default_provider(&self) -> Result<(&str, &ProviderConfig), ConfigError> {
        let name = self.defaults.provider.as_str();
        self.providers
            .get(name)
            .map(|p| (name, p))
            .ok_or_else(|| ConfigError::ValidationError(format!("provider '{name}' not configured")))
    }

    /// Persist a new default model.
    pub fn switch_model(&mut self, model: impl Into<String>) -> Result<(), ConfigError> {
        self.defaults.model = model.into();
        self.save_to(&Self::config_dir().join("config.toml"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.defaults.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        for (name, provider) in &self.providers {
            if provider.base_url.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{name}' has an empty base_url"
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to write config file at {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.defaults.provider, "ollama");
        assert_eq!(config.defaults.max_tokens, 2048);
        assert!(config.providers.contains_key("openai"));
        assert!(config.providers.contains_key("ollama"));
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.defaults.provider, config.defaults.provider);
        assert_eq!(parsed.providers.len(), config.providers.len());
        assert_eq!(parsed.providers["ollama"].kind, ProviderKind::Ollama);
    }

    #[test]
    fn provider_kind_parsing() {
        let toml_str = r#"
[providers.local]
type = "ollama"
base_url = "http://localhost:11434"

[providers.cloud]
type = "openai"
api_key = "sk-test"
base_url = "https://api.openai.com"

[defaults]
provider = "local"
model = "llama3.2:latest"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers["local"].kind, ProviderKind::Ollama);
        assert_eq!(config.providers["cloud"].kind, ProviderKind::OpenAi);
        assert_eq!(config.defaults.provider, "local");
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            defaults: Defaults {
                temperature: 5.0,
                ..Defaults::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().defaults.provider, "ollama");
    }

    #[test]
    fn unknown_default_provider_rejected() {
        let config = AppConfig {
            defaults: Defaults {
                provider: "missing".into(),
                ..Defaults::default()
            },
            ..AppConfig::default()
        };
        assert!(config.default_provider().is_err());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::default();
        config.save_to(&path).unwrap();

        let reloaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(reloaded.defaults.model, config.defaults.model);
    }

    #[test]
    fn api_key_redacted_in_debug() {
        let provider = ProviderConfig {
            kind: ProviderKind::OpenAi,
            api_key: Some("sk-supersecret".into()),
            base_url: "https://api.openai.com".into(),
        };
        let debug = format!("{provider:?}");
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
