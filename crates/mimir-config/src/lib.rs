//! Mimir Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.mimir/config.toml`
//! - Local config: `.mimir/config.toml` (in workspace)
//! - Environment variables (`MIMIR_*`, `OLLAMA_BASE_URL`)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → environment → CLI overrides.
//! Provider credentials are never written to config files; settings name the
//! environment variable that holds each key.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};

/// Fixed width every stored vector is padded or truncated to.
pub const MAX_EMBEDDING_DIMENSIONS: usize = 1536;

/// Upper bound imposed by the HNSW index on vector width.
pub const HNSW_DIMENSION_LIMIT: usize = 2000;

/// Largest batch a single upstream embedding call may carry.
pub const MAX_BATCH_SIZE: usize = 2048;

/// Root configuration for Mimir.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MimirConfig {
    /// Embedding provider configuration
    pub embedding: EmbeddingSettings,

    /// Search tuning
    pub search: SearchSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Embedding provider configuration.
///
/// # Example TOML
///
/// ```toml
/// [embedding]
/// default_model = "voyage-3"
/// preferred_provider = "voyage"
/// batch_size = 100
///
/// [embedding.voyage]
/// api_key_env = "VOYAGE_API_KEY"
///
/// [embedding.ollama]
/// url = "http://localhost:11434"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Model used when a request names none (None = pick from configured providers)
    pub default_model: Option<String>,

    /// Provider whose first model wins default selection when it is configured
    pub preferred_provider: EmbeddingProviderType,

    /// Texts per upstream call in batch embedding
    pub batch_size: usize,

    /// Width of the stored vector column
    pub storage_dimensions: usize,

    /// Voyage AI settings
    pub voyage: VoyageSettings,

    /// OpenAI settings
    pub openai: OpenAISettings,

    /// Ollama (local) settings
    pub ollama: OllamaSettings,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            default_model: None,
            preferred_provider: EmbeddingProviderType::Voyage,
            batch_size: 100,
            storage_dimensions: MAX_EMBEDDING_DIMENSIONS,
            voyage: VoyageSettings::default(),
            openai: OpenAISettings::default(),
            ollama: OllamaSettings::default(),
        }
    }
}

impl EmbeddingSettings {
    /// Validate ranges of the embedding settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::invalid_value(
                "embedding.batch_size",
                format!("must be between 1 and {}", MAX_BATCH_SIZE),
            ));
        }
        if self.storage_dimensions == 0 || self.storage_dimensions > HNSW_DIMENSION_LIMIT {
            return Err(ConfigError::invalid_value(
                "embedding.storage_dimensions",
                format!("must be between 1 and {}", HNSW_DIMENSION_LIMIT),
            ));
        }
        if let Some(ref model) = self.default_model {
            if model.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    "embedding.default_model",
                    "must not be empty when set",
                ));
            }
        }
        if self.ollama.url.is_empty() {
            return Err(ConfigError::invalid_value("embedding.ollama.url", "is required"));
        }
        Ok(())
    }
}

/// Embedding provider type selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProviderType {
    /// Voyage AI cloud API (default preference)
    #[default]
    Voyage,
    /// OpenAI cloud API
    Openai,
    /// Local Ollama server
    Ollama,
}

impl EmbeddingProviderType {
    /// Stable provider name used as the registry key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voyage => "voyage",
            Self::Openai => "openai",
            Self::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "voyage" | "voyageai" | "voyage-ai" => Ok(Self::Voyage),
            "openai" => Ok(Self::Openai),
            "ollama" | "local" => Ok(Self::Ollama),
            _ => Err(ConfigError::invalid_value(
                "embedding.preferred_provider",
                format!(
                    "unknown embedding provider '{}'. Valid values: voyage, openai, ollama",
                    s
                ),
            )),
        }
    }
}

/// Resolve an API key from the environment variable named by `env_name`.
fn key_from_env(env_name: Option<&str>) -> Option<String> {
    env_name
        .and_then(|name| std::env::var(name).ok())
        .filter(|value| !value.trim().is_empty())
}

/// Voyage AI provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoyageSettings {
    /// API base URL
    pub url: String,

    /// Environment variable name containing the API key
    pub api_key_env: Option<String>,

    /// Timeout for single-text requests in seconds
    pub timeout_secs: u64,

    /// Timeout for batch requests in seconds
    pub batch_timeout_secs: u64,
}

impl Default for VoyageSettings {
    fn default() -> Self {
        Self {
            url: "https://api.voyageai.com/v1".to_string(),
            api_key_env: Some("VOYAGE_API_KEY".to_string()),
            timeout_secs: 60,
            batch_timeout_secs: 120,
        }
    }
}

impl VoyageSettings {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        key_from_env(self.api_key_env.as_deref())
    }
}

/// OpenAI provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAISettings {
    /// API base URL
    pub url: String,

    /// Environment variable name containing the API key
    pub api_key_env: Option<String>,

    /// Timeout for single-text requests in seconds
    pub timeout_secs: u64,

    /// Timeout for batch requests in seconds
    pub batch_timeout_secs: u64,
}

impl Default for OpenAISettings {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            timeout_secs: 60,
            batch_timeout_secs: 120,
        }
    }
}

impl OpenAISettings {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        key_from_env(self.api_key_env.as_deref())
    }
}

/// Ollama provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    /// Ollama server URL
    pub url: String,

    /// Timeout for embedding requests in seconds
    pub timeout_secs: u64,

    /// Timeout for the reachability probe in milliseconds
    pub probe_timeout_ms: u64,

    /// Timeout for model discovery in seconds
    pub discovery_timeout_secs: u64,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            timeout_secs: 30,
            probe_timeout_ms: 1000,
            discovery_timeout_secs: 5,
        }
    }
}

/// Search tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// RRF damping constant
    pub rrf_k: u32,

    /// Weight of the semantic term in hybrid fusion (lexical gets the rest)
    pub semantic_weight: f32,

    /// Candidates each strategy fetches per requested hybrid result
    pub overfetch_factor: usize,

    /// Limit used when a request names none
    pub default_limit: usize,

    /// Largest accepted limit
    pub max_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            semantic_weight: 0.5,
            overfetch_factor: 2,
            default_limit: 20,
            max_limit: 100,
        }
    }
}

impl SearchSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rrf_k == 0 {
            return Err(ConfigError::invalid_value("search.rrf_k", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.semantic_weight) {
            return Err(ConfigError::invalid_value(
                "search.semantic_weight",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.overfetch_factor < 2 {
            return Err(ConfigError::invalid_value("search.overfetch_factor", "must be at least 2"));
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(ConfigError::invalid_value(
                "search.default_limit",
                format!("must be between 1 and max_limit ({})", self.max_limit),
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override default embedding model
    pub default_model: Option<String>,

    /// Override preferred provider
    pub preferred_provider: Option<EmbeddingProviderType>,

    /// Override embedding batch size
    pub batch_size: Option<usize>,

    /// Override Ollama URL
    pub ollama_url: Option<String>,

    /// Override log level
    pub log_level: Option<String>,
}

/// Environment variables read by [`MimirConfig::apply_env`].
pub mod env {
    pub const DEFAULT_MODEL: &str = "MIMIR_DEFAULT_EMBEDDING_MODEL";
    pub const BATCH_SIZE: &str = "MIMIR_EMBEDDING_BATCH_SIZE";
    pub const OLLAMA_URL: &str = "OLLAMA_BASE_URL";
    pub const LOG_LEVEL: &str = "MIMIR_LOG_LEVEL";
}

impl MimirConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref model) = overrides.default_model {
            self.embedding.default_model = Some(model.clone());
        }

        if let Some(provider) = overrides.preferred_provider {
            self.embedding.preferred_provider = provider;
        }

        if let Some(batch_size) = overrides.batch_size {
            self.embedding.batch_size = batch_size;
        }

        if let Some(ref url) = overrides.ollama_url {
            self.embedding.ollama.url = url.clone();
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Apply overrides from process environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup(env::DEFAULT_MODEL).filter(|v| !v.is_empty()) {
            self.embedding.default_model = Some(model);
        }

        if let Some(raw) = lookup(env::BATCH_SIZE) {
            self.embedding.batch_size = raw.trim().parse().map_err(|_| {
                ConfigError::invalid_value(env::BATCH_SIZE, format!("'{}' is not a number", raw))
            })?;
        }

        if let Some(url) = lookup(env::OLLAMA_URL).filter(|v| !v.is_empty()) {
            self.embedding.ollama.url = url;
        }

        if let Some(level) = lookup(env::LOG_LEVEL).filter(|v| !v.is_empty()) {
            self.logging.level = level.to_lowercase();
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.search.validate()?;
        Ok(())
    }
}
