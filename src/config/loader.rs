//! Configuration loader
//!
//! Handles loading configuration from TOML files and merging with defaults.

use super::defaults::default_config;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_target")]
    pub target: TargetConfig,

    #[serde(default = "default_effects")]
    pub effects: EffectsConfig,

    #[serde(default = "default_memory")]
    pub memory: MemoryConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,
}

/// Process to attach to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Executable name or pid
    #[serde(default = "default_process")]
    pub process: String,
}

/// Effects to enable and how often to re-apply them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: Vec<u32>,
    /// Effects whose failure aborts the run instead of being skipped
    #[serde(default = "default_critical")]
    pub critical: Vec<u32>,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

/// Memory access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_max_read_size")]
    pub max_read_size: usize,
    #[serde(default = "default_verify_writes")]
    pub verify_writes: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Configuration loader
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Creates a new configuration loader
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        ConfigLoader {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Loads configuration from file
    pub fn load(&self) -> Result<Config, ConfigError> {
        if !self.config_path.exists() {
            return Err(ConfigError::FileNotFound(
                self.config_path.display().to_string(),
            ));
        }

        let contents = fs::read_to_string(&self.config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Loads configuration, returning defaults only if the file doesn't exist
    pub fn load_or_default(&self) -> Result<Config, ConfigError> {
        match self.load() {
            Err(ConfigError::FileNotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    /// Saves configuration to file
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, contents)?;
        Ok(())
    }
}

/// Loads `memfx.toml` from the working directory, or defaults
pub fn load_config() -> Result<Config, ConfigError> {
    ConfigLoader::new("memfx.toml").load_or_default()
}

// Default functions for serde
fn default_target() -> TargetConfig {
    TargetConfig {
        process: default_process(),
    }
}

fn default_effects() -> EffectsConfig {
    let defaults = default_config();
    EffectsConfig {
        enabled: defaults.effects.enabled,
        critical: defaults.effects.critical,
        tick_interval_ms: defaults.effects.tick_interval_ms,
    }
}

fn default_memory() -> MemoryConfig {
    let defaults = default_config();
    MemoryConfig {
        max_read_size: defaults.memory.max_read_size,
        verify_writes: defaults.memory.verify_writes,
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
    }
}

// Individual field defaults
fn default_process() -> String {
    default_config().target.process
}

fn default_enabled() -> Vec<u32> {
    default_config().effects.enabled
}

fn default_critical() -> Vec<u32> {
    default_config().effects.critical
}

fn default_tick_interval_ms() -> u64 {
    default_config().effects.tick_interval_ms
}

fn default_max_read_size() -> usize {
    default_config().memory.max_read_size
}

fn default_verify_writes() -> bool {
    default_config().memory.verify_writes
}

fn default_log_level() -> String {
    default_config().logging.level
}

impl Default for Config {
    fn default() -> Self {
        Config {
            target: default_target(),
            effects: default_effects(),
            memory: default_memory(),
            logging: default_logging(),
        }
    }
}
