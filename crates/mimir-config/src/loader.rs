//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.mimir/config.toml`
//! 2. Local config: `.mimir/config.toml` (in workspace)
//! 3. Environment variables
//! 4. CLI overrides
//!
//! Later sources override earlier ones.

use crate::error::ConfigError;
use crate::{
    ConfigOverrides, EmbeddingProviderType, EmbeddingSettings, LoggingConfig, MimirConfig,
    OllamaSettings, OpenAISettings, SearchSettings, VoyageSettings,
};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".mimir";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".mimir";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.mimir`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<MimirConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.mimir`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a workspace.
    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a workspace with optional CLI overrides.
    ///
    /// Merges config in order: global → local → process environment → overrides,
    /// then validates the result.
    pub fn load(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<MimirConfig, ConfigError> {
        self.load_with_env(workspace_root, overrides, |key| std::env::var(key).ok())
    }

    /// Same as [`ConfigLoader::load`] with an explicit environment lookup.
    pub fn load_with_env<F>(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
        lookup: F,
    ) -> Result<MimirConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = MimirConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(workspace_root)? {
            config = merge_configs(config, local_config);
        }

        config.apply_env_with(lookup)?;

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<MimirConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;

        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a workspace.
    pub fn load_local(&self, workspace_root: &Path) -> Result<Option<MimirConfig>, ConfigError> {
        let local_path = self.local_config_path(workspace_root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Save configuration to the global config file.
    pub fn save_global(&self, config: &MimirConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        save_config_file(&global_dir.join(CONFIG_FILE_NAME), config)
    }

    /// Save configuration to the local config file for a workspace.
    pub fn save_local(
        &self,
        workspace_root: &Path,
        config: &MimirConfig,
    ) -> Result<(), ConfigError> {
        save_config_file(&self.local_config_path(workspace_root), config)
    }

    /// Initialize local configuration for a workspace.
    ///
    /// Creates `.mimir/config.toml` with default configuration unless one exists.
    pub fn init_local(&self, workspace_root: &Path) -> Result<PathBuf, ConfigError> {
        let config_path = self.local_config_path(workspace_root);
        if !config_path.exists() {
            save_config_file(&config_path, &MimirConfig::default())?;
        }
        Ok(config_path)
    }

    /// Clear cached global configuration.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<MimirConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &MimirConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Pick `overlay` when it differs from the default value, otherwise keep `base`.
fn pick<T: PartialEq>(base: T, overlay: T, default: T) -> T {
    if overlay != default {
        overlay
    } else {
        base
    }
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// Field-by-field so partial config files only change what they name.
fn merge_configs(base: MimirConfig, overlay: MimirConfig) -> MimirConfig {
    MimirConfig {
        embedding: merge_embedding(base.embedding, overlay.embedding),
        search: merge_search(base.search, overlay.search),
        logging: merge_logging(base.logging, overlay.logging),
    }
}

fn merge_embedding(base: EmbeddingSettings, overlay: EmbeddingSettings) -> EmbeddingSettings {
    let defaults = EmbeddingSettings::default();
    EmbeddingSettings {
        default_model: overlay.default_model.or(base.default_model),
        preferred_provider: pick(
            base.preferred_provider,
            overlay.preferred_provider,
            EmbeddingProviderType::default(),
        ),
        batch_size: pick(base.batch_size, overlay.batch_size, defaults.batch_size),
        storage_dimensions: pick(
            base.storage_dimensions,
            overlay.storage_dimensions,
            defaults.storage_dimensions,
        ),
        voyage: merge_voyage(base.voyage, overlay.voyage),
        openai: merge_openai(base.openai, overlay.openai),
        ollama: merge_ollama(base.ollama, overlay.ollama),
    }
}

fn merge_voyage(base: VoyageSettings, overlay: VoyageSettings) -> VoyageSettings {
    let d = VoyageSettings::default();
    VoyageSettings {
        url: pick(base.url, overlay.url, d.url),
        api_key_env: pick(base.api_key_env, overlay.api_key_env, d.api_key_env),
        timeout_secs: pick(base.timeout_secs, overlay.timeout_secs, d.timeout_secs),
        batch_timeout_secs: pick(
            base.batch_timeout_secs,
            overlay.batch_timeout_secs,
            d.batch_timeout_secs,
        ),
    }
}

fn merge_openai(base: OpenAISettings, overlay: OpenAISettings) -> OpenAISettings {
    let d = OpenAISettings::default();
    OpenAISettings {
        url: pick(base.url, overlay.url, d.url),
        api_key_env: pick(base.api_key_env, overlay.api_key_env, d.api_key_env),
        timeout_secs: pick(base.timeout_secs, overlay.timeout_secs, d.timeout_secs),
        batch_timeout_secs: pick(
            base.batch_timeout_secs,
            overlay.batch_timeout_secs,
            d.batch_timeout_secs,
        ),
    }
}

fn merge_ollama(base: OllamaSettings, overlay: OllamaSettings) -> OllamaSettings {
    let d = OllamaSettings::default();
    OllamaSettings {
        url: pick(base.url, overlay.url, d.url),
        timeout_secs: pick(base.timeout_secs, overlay.timeout_secs, d.timeout_secs),
        probe_timeout_ms: pick(
            base.probe_timeout_ms,
            overlay.probe_timeout_ms,
            d.probe_timeout_ms,
        ),
        discovery_timeout_secs: pick(
            base.discovery_timeout_secs,
            overlay.discovery_timeout_secs,
            d.discovery_timeout_secs,
        ),
    }
}

fn merge_search(base: SearchSettings, overlay: SearchSettings) -> SearchSettings {
    let d = SearchSettings::default();
    SearchSettings {
        rrf_k: pick(base.rrf_k, overlay.rrf_k, d.rrf_k),
        semantic_weight: pick(base.semantic_weight, overlay.semantic_weight, d.semantic_weight),
        overfetch_factor: pick(
            base.overfetch_factor,
            overlay.overfetch_factor,
            d.overfetch_factor,
        ),
        default_limit: pick(base.default_limit, overlay.default_limit, d.default_limit),
        max_limit: pick(base.max_limit, overlay.max_limit, d.max_limit),
    }
}

fn merge_logging(base: LoggingConfig, overlay: LoggingConfig) -> LoggingConfig {
    LoggingConfig {
        level: if overlay.level != "info" {
            overlay.level
        } else {
            base.level
        },
        format: pick(base.format, overlay.format, crate::LogFormat::default()),
    }
}
