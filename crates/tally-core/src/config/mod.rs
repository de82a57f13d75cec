//! Configuration file support.
//!
//! Configuration precedence (later wins):
//! 1. Defaults
//! 2. Global config file (`~/.tally/config.toml`)
//! 3. Local config file (`./.tallyrc`)
//! 4. Environment variables (`TALLY_TIMEOUT_MS`, `TALLY_RETRIES`, `TALLY_MAX_WORKERS`)
//! 5. CLI arguments (applied by the binary)

use crate::batch::BatchConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Batch defaults as written in a config file. Unset fields keep the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_timeout_ms: Option<u64>,
}

impl From<&BatchConfig> for BatchSection {
    fn from(config: &BatchConfig) -> Self {
        Self {
            timeout_ms: Some(config.timeout_ms),
            retries: Some(config.retries),
            max_workers: Some(config.max_workers),
            retry_delay_ms: Some(config.retry_delay_ms),
            ack_timeout_ms: Some(config.ack_timeout_ms),
            result_timeout_ms: config.result_timeout_ms,
        }
    }
}

/// Output format configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format (human, json). Unset means human.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Where to write the report, if anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl OutputConfig {
    /// The configured format name, falling back to `human`.
    pub fn format(&self) -> &str {
        self.format.as_deref().unwrap_or("human")
    }
}

/// Tally configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyConfig {
    /// Log level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    #[serde(default)]
    pub batch: BatchSection,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl TallyConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(format!("Failed to serialize: {}", e)))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::ReadError(format!("Failed to create directory: {}", e)))?;
        }

        std::fs::write(path, content)
            .map_err(|e| ConfigError::ReadError(format!("Failed to write file: {}", e)))?;

        Ok(())
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".tally")
            .join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".tallyrc")
    }

    /// Discover and load configuration files.
    ///
    /// A missing file is skipped; a file that exists but does not parse is an error.
    pub fn discover_and_load() -> ConfigResult<Self> {
        Self::load_layers(&[Self::default_global_path(), Self::default_local_path()])
    }

    /// Merge the given files in order, skipping ones that do not exist.
    pub fn load_layers(paths: &[PathBuf]) -> ConfigResult<Self> {
        let mut config = Self::default();
        for path in paths {
            match Self::load_from_file(path) {
                Ok(layer) => config.merge(&layer),
                Err(ConfigError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(config)
    }

    /// Merge another configuration into this one.
    ///
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &Self) {
        let batch = &other.batch;
        if batch.timeout_ms.is_some() {
            self.batch.timeout_ms = batch.timeout_ms;
        }
        if batch.retries.is_some() {
            self.batch.retries = batch.retries;
        }
        if batch.max_workers.is_some() {
            self.batch.max_workers = batch.max_workers;
        }
        if batch.retry_delay_ms.is_some() {
            self.batch.retry_delay_ms = batch.retry_delay_ms;
        }
        if batch.ack_timeout_ms.is_some() {
            self.batch.ack_timeout_ms = batch.ack_timeout_ms;
        }
        if batch.result_timeout_ms.is_some() {
            self.batch.result_timeout_ms = batch.result_timeout_ms;
        }
        if let Some(ref log_level) = other.log_level {
            self.log_level = Some(log_level.clone());
        }
        if other.output.format.is_some() {
            self.output.format = other.output.format.clone();
        }
        if other.output.path.is_some() {
            self.output.path = other.output.path.clone();
        }
    }

    /// Apply `TALLY_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_env(&lookup, "TALLY_TIMEOUT_MS")? {
            self.batch.timeout_ms = Some(value);
        }
        if let Some(value) = parse_env(&lookup, "TALLY_RETRIES")? {
            self.batch.retries = Some(value);
        }
        if let Some(value) = parse_env(&lookup, "TALLY_MAX_WORKERS")? {
            self.batch.max_workers = Some(value);
        }
        if let Some(level) = lookup("TALLY_LOG_LEVEL") {
            self.log_level = Some(level);
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> ConfigResult<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Resolve the batch section against the defaults.
    pub fn batch_config(&self) -> BatchConfig {
        let defaults = BatchConfig::default();
        BatchConfig {
            timeout_ms: self.batch.timeout_ms.unwrap_or(defaults.timeout_ms),
            retries: self.batch.retries.unwrap_or(defaults.retries),
            max_workers: self.batch.max_workers.unwrap_or(defaults.max_workers),
            retry_delay_ms: self.batch.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
            ack_timeout_ms: self.batch.ack_timeout_ms.unwrap_or(defaults.ack_timeout_ms),
            result_timeout_ms: self.batch.result_timeout_ms.or(defaults.result_timeout_ms),
        }
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> ConfigResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidValue(format!("{}={}", key, raw)))
        })
        .transpose()
}
