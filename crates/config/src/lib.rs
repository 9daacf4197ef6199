//! Configuration loading, validation, and management for taskloop.
//!
//! Loads configuration from `~/.taskloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use taskloop_core::provider::ToolChoice;

/// The root configuration structure.
///
/// Maps directly to `~/.taskloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion and embedding endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider name ("openai", "openrouter", "ollama", or any label)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Endpoint override; well-known providers have a built-in default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Completion model
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

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
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("agent", &self.agent)
            .field("memory", &self.memory)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Provider calls allowed per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// "auto", "none", or the name of a tool the model must call
    #[serde(default = "default_tool_choice")]
    pub tool_choice: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Tool whose successful result ends the run
    #[serde(default = "default_sentinel")]
    pub sentinel: Option<String>,

    /// Boolean field of the sentinel result that must be `true`
    #[serde(default = "default_sentinel_flag")]
    pub sentinel_flag: Option<String>,

    /// Tools that must have succeeded before the sentinel is honoured
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sentinel_prerequisites: Vec<String>,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_tool_choice() -> String {
    "auto".into()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant with long-term memory. Use getMemory to recall \
     relevant facts before answering and saveMemory to store anything worth \
     remembering. When the task is finished, call isTaskComplete with your final answer."
        .into()
}
fn default_sentinel() -> Option<String> {
    Some("isTaskComplete".into())
}
fn default_sentinel_flag() -> Option<String> {
    Some("isComplete".into())
}

impl AgentConfig {
    pub fn tool_choice(&self) -> ToolChoice {
        ToolChoice::from(self.tool_choice.as_str())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_choice: default_tool_choice(),
            system_prompt: default_system_prompt(),
            sentinel: default_sentinel(),
            sentinel_flag: default_sentinel_flag(),
            sentinel_prerequisites: Vec::new(),
        }
    }
}

/// Vector memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "sqlite" or "in_memory"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// SQLite file; defaults to `~/.taskloop/memory.sqlite`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Vector dimension, fixed for the lifetime of a database
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Default `k` for retrieval
    #[serde(default = "default_retrieve_limit")]
    pub retrieve_limit: usize,

    /// Use the local feature-hashing embedder instead of the remote service
    #[serde(default)]
    pub offline_embeddings: bool,

    /// Append-only notes file. When set, chat registers the `notepad` tool
    /// and shows the file in the system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notepad: Option<PathBuf>,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_dimensions() -> usize {
    256
}
fn default_retrieve_limit() -> usize {
    10
}

impl MemoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("memory.sqlite"))
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
            embedding_model: default_embedding_model(),
            dimensions: default_dimensions(),
            retrieve_limit: default_retrieve_limit(),
            offline_embeddings: false,
            notepad: None,
        }
    }
}

/// Backoff for caller-side retries of provider and embedding calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.taskloop/config.toml).
    ///
    /// Environment overrides:
    /// - `TASKLOOP_API_KEY`, then `OPENAI_API_KEY` (only if the file sets no key)
    /// - `TASKLOOP_MODEL`
    /// - `TASKLOOP_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
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

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("TASKLOOP_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(model) = lookup("TASKLOOP_MODEL") {
            self.model = model;
        }
        if let Some(base_url) = lookup("TASKLOOP_BASE_URL") {
            self.base_url = Some(base_url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".taskloop")
    }

    /// The endpoint to use: the explicit override or the provider's default.
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| default_base_url(&self.provider).into())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }
        if self.memory.dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "memory.dimensions must be at least 1".into(),
            ));
        }
        if self.memory.retrieve_limit == 0 {
            return Err(ConfigError::ValidationError(
                "memory.retrieve_limit must be at least 1".into(),
            ));
        }
        if !matches!(self.memory.backend.as_str(), "sqlite" | "in_memory") {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be \"sqlite\" or \"in_memory\", got \"{}\"",
                self.memory.backend
            )));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "retry.backoff_multiplier must be >= 1.0".into(),
            ));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            base_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            memory: MemoryConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Default base URL for well-known OpenAI-compatible providers.
pub fn default_base_url(provider_name: &str) -> &'static str {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        "vllm" => "http://localhost:8000/v1",
        _ => "https://api.openai.com/v1",
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
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.memory.dimensions, 256);
        assert_eq!(config.agent.tool_choice(), ToolChoice::Auto);
        assert_eq!(config.agent.sentinel.as_deref(), Some("isTaskComplete"));
        assert!(config.memory.notepad.is_none());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.memory.embedding_model, config.memory.embedding_model);
        assert_eq!(parsed.retry.max_retries, 3);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            model = "gpt-4o"

            [agent]
            max_iterations = 3
            tool_choice = "getWeather"

            [memory]
            backend = "in_memory"
            notepad = "/tmp/taskloop-notes.txt"
            "#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.agent.max_iterations, 3);
        assert_eq!(config.agent.tool_choice(), ToolChoice::Forced("getWeather".into()));
        assert_eq!(config.memory.backend, "in_memory");
        assert_eq!(config.memory.dimensions, 256);
        assert_eq!(config.memory.notepad, Some(PathBuf::from("/tmp/taskloop-notes.txt")));
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn invalid_values_rejected() {
        let mut config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());

        config = AppConfig::default();
        config.memory.dimensions = 0;
        assert!(config.validate().is_err());

        config = AppConfig::default();
        config.memory.backend = "postgres".into();
        assert!(config.validate().is_err());

        config = AppConfig::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider, "openai");
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-openai"),
            ("TASKLOOP_MODEL", "gpt-4.1"),
            ("TASKLOOP_BASE_URL", "http://localhost:8000/v1"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(config.model, "gpt-4.1");
        assert_eq!(config.resolved_base_url(), "http://localhost:8000/v1");
    }

    #[test]
    fn file_api_key_wins_over_env() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(|k| (k == "TASKLOOP_API_KEY").then(|| "from-env".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn base_url_defaults_per_provider() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
        assert_eq!(AppConfig::default().resolved_base_url(), "https://api.openai.com/v1");
    }
}
