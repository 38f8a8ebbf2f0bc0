//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use parley_core::catalog::StaticModelCatalog;
use parley_core::message::Modality;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider name (used for logging and the default endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Override the provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Completion model used when a chat has no override
    #[serde(default = "default_model")]
    pub default_model: String,

    /// System prompt used when a chat has no override
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Sender identities with master privileges
    #[serde(default)]
    pub master_ids: Vec<String>,

    /// Orchestration loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Database settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Translator models per modality
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Known models and their accepted input modalities
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,

    /// Audio transcoding settings
    #[serde(default)]
    pub audio: AudioConfig,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_system_prompt() -> String {
    concat!(
        "You are Parley, a helpful assistant living in a chat. ",
        "Keep answers short and conversational. ",
        "Use the available tools when they help the user.",
    )
    .into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("master_ids", &self.master_ids)
            .field("agent", &self.agent)
            .field("storage", &self.storage)
            .field("translation", &self.translation)
            .field("models", &self.models)
            .field("audio", &self.audio)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum automatic continuation rounds per turn
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// How many persisted messages form the model's context
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Unanswered confirmations are treated as denied after this long
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_max_depth() -> u32 {
    10
}
fn default_history_limit() -> usize {
    50
}
fn default_confirm_timeout() -> u64 {
    120
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            history_limit: default_history_limit(),
            confirm_timeout_secs: default_confirm_timeout(),
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path; defaults to `~/.parley/parley.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,

    /// Modalities assumed for models missing from `[models]`
    #[serde(default = "default_fallback_modalities")]
    pub fallback_modalities: Vec<Modality>,
}

fn default_fallback_modalities() -> Vec<Modality> {
    vec![Modality::Text, Modality::Image]
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            image: None,
            audio: None,
            video: None,
            fallback_modalities: default_fallback_modalities(),
        }
    }
}

impl TranslationConfig {
    /// The global translator model for a modality.
    pub fn model_for(&self, modality: Modality) -> Option<&str> {
        match modality {
            Modality::Image => self.image.as_deref(),
            Modality::Audio => self.audio.as_deref(),
            Modality::Video => self.video.as_deref(),
            Modality::Text => None,
        }
    }

    pub fn defaults(&self) -> HashMap<Modality, String> {
        [Modality::Image, Modality::Audio, Modality::Video]
            .into_iter()
            .filter_map(|m| self.model_for(m).map(|model| (m, model.to_string())))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub modalities: Vec<Modality>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Path or name of the ffmpeg binary
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,

    /// Encodings the completion service accepts as-is
    #[serde(default = "default_accepted_formats")]
    pub accepted_formats: Vec<String>,

    /// Encoding other audio is transcoded into
    #[serde(default = "default_target_format")]
    pub target_format: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".into()
}
fn default_accepted_formats() -> Vec<String> {
    vec!["wav".into(), "mp3".into()]
}
fn default_target_format() -> String {
    "mp3".into()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            accepted_formats: default_accepted_formats(),
            target_format: default_target_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.parley/config.toml).
    ///
    /// Also checks environment variables:
    /// - `PARLEY_API_KEY` (highest priority), `OPENROUTER_API_KEY`, `OPENAI_API_KEY`
    /// - `PARLEY_MODEL`, `PARLEY_API_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("PARLEY_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("PARLEY_MODEL") {
            self.default_model = model;
        }

        if let Ok(url) = std::env::var("PARLEY_API_URL") {
            self.api_url = Some(url);
        }
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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// The SQLite database path.
    pub fn storage_path(&self) -> PathBuf {
        match &self.storage.path {
            Some(path) => PathBuf::from(path),
            None => Self::config_dir().join("parley.db"),
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_depth must be at least 1".into(),
            ));
        }

        if self.agent.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "agent.history_limit must be at least 1".into(),
            ));
        }

        if let Some(t) = self.agent.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "agent.temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if !self
            .audio
            .accepted_formats
            .iter()
            .any(|f| f.eq_ignore_ascii_case(&self.audio.target_format))
        {
            return Err(ConfigError::ValidationError(format!(
                "audio.target_format '{}' must be one of audio.accepted_formats",
                self.audio.target_format
            )));
        }

        Ok(())
    }

    /// Build the model metadata catalog from `[models]`.
    pub fn model_catalog(&self) -> StaticModelCatalog {
        let models = self
            .models
            .iter()
            .map(|(id, m)| (id.clone(), m.modalities.clone()))
            .collect();
        StaticModelCatalog::new(models).with_fallback(self.translation.fallback_modalities.clone())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: None,
            default_model: default_model(),
            system_prompt: default_system_prompt(),
            master_ids: vec![],
            agent: AgentConfig::default(),
            storage: StorageConfig::default(),
            translation: TranslationConfig::default(),
            models: HashMap::new(),
            audio: AudioConfig::default(),
        }
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

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::catalog::ModelCatalog;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "openrouter");
        assert_eq!(config.agent.max_depth, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.agent.history_limit, config.agent.history_limit);
    }

    #[test]
    fn zero_depth_rejected() {
        let config = AppConfig {
            agent: AgentConfig {
                max_depth: 0,
                ..AgentConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn target_audio_format_must_be_accepted() {
        let config = AppConfig {
            audio: AudioConfig {
                target_format: "flac".into(),
                ..AudioConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        let config = result.unwrap();
        assert_eq!(config.provider, "openrouter");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_model = "openai/gpt-4o"
master_ids = ["+15550001"]

[agent]
max_depth = 4

[translation]
audio = "openai/whisper-ish"

[models."openai/gpt-4o"]
modalities = ["text", "image", "audio"]
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "openai/gpt-4o");
        assert_eq!(config.agent.max_depth, 4);
        assert_eq!(config.master_ids, vec!["+15550001"]);
        assert_eq!(
            config.translation.model_for(Modality::Audio),
            Some("openai/whisper-ish")
        );
        assert_eq!(config.translation.model_for(Modality::Image), None);

        let catalog = config.model_catalog();
        assert!(catalog.supports("openai/gpt-4o", Modality::Audio));
        assert!(!catalog.supports("openai/gpt-4o", Modality::Video));
        assert!(catalog.supports("something-else", Modality::Image));
    }

    #[test]
    fn broken_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "agent = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openrouter"));
        assert!(toml_str.contains("max_depth"));
    }
}
