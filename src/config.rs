//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Resource store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Snapshot file of the file-backed tree store
    #[serde(default = "default_data_file")]
    pub data_file: String,

    /// Where the history lives inside the store
    #[serde(default = "default_root_path")]
    pub root_path: String,
}

fn default_data_file() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("scanvault").join("history.json").to_string_lossy().to_string())
        .unwrap_or_else(|| "./scanvault_data/history.json".to_string())
}

fn default_root_path() -> String {
    crate::history::DEFAULT_ROOT.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            root_path: default_root_path(),
        }
    }
}

/// History retention and paging
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_days_to_keep")]
    pub days_to_keep: u32,

    #[serde(default = "default_purge_batch_size")]
    pub purge_batch_size: usize,

    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_days_to_keep() -> u32 {
    30
}

fn default_purge_batch_size() -> usize {
    crate::history::DEFAULT_BATCH_SIZE
}

fn default_page_size() -> usize {
    20
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            days_to_keep: default_days_to_keep(),
            purge_batch_size: default_purge_batch_size(),
            page_size: default_page_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        // Try default config locations
        let config_paths = [
            dirs::config_dir().map(|p| p.join("scanvault").join("config.toml")),
            Some(PathBuf::from("/etc/scanvault/config.toml")),
            Some(PathBuf::from("./scanvault.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Store overrides
        if let Some(data_file) = var("SCANVAULT_DATA_FILE") {
            self.store.data_file = data_file;
        }
        if let Some(root_path) = var("SCANVAULT_ROOT_PATH") {
            self.store.root_path = root_path;
        }

        // History overrides
        if let Some(days) = var("SCANVAULT_DAYS_TO_KEEP") {
            match days.parse() {
                Ok(d) => self.history.days_to_keep = d,
                Err(_) => tracing::warn!("Ignoring invalid SCANVAULT_DAYS_TO_KEEP={}", days),
            }
        }

        // Logging overrides
        if let Some(level) = var("SCANVAULT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("SCANVAULT_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Scanvault Configuration
#
# Environment variables override these settings:
# - SCANVAULT_DATA_FILE
# - SCANVAULT_ROOT_PATH
# - SCANVAULT_DAYS_TO_KEEP
# - SCANVAULT_LOG_LEVEL
# - SCANVAULT_LOG_FORMAT

[store]
# Snapshot file of the history store
data_file = "~/.local/share/scanvault/history.json"

# Location of the history inside the store
root_path = "/var/avs/history"

[history]
# Days of history kept by `scanvault purge`
days_to_keep = 30

# Nodes removed per store batch while purging
purge_batch_size = 1000

# Default number of entries shown by `scanvault history`
page_size = 20

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/scanvault/scanvault.log"
"#
    .to_string()
}
