//! Configuration validator
//!
//! Validates configuration values to ensure they are within acceptable ranges.

use super::loader::{Config, ConfigError, EffectsConfig, LoggingConfig, MemoryConfig, TargetConfig};
use std::collections::HashSet;
use tracing::warn;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the entire configuration
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        Self::validate_target(&config.target)?;
        Self::validate_effects(&config.effects)?;
        Self::validate_memory(&config.memory)?;
        Self::validate_logging(&config.logging)?;
        Ok(())
    }

    fn validate_target(target: &TargetConfig) -> Result<(), ConfigError> {
        if target.process.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "Target process cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_effects(effects: &EffectsConfig) -> Result<(), ConfigError> {
        if !(10..=60_000).contains(&effects.tick_interval_ms) {
            return Err(ConfigError::Invalid(format!(
                "Tick interval must be between 10 and 60000 ms, got {}",
                effects.tick_interval_ms
            )));
        }

        let mut seen = HashSet::new();
        for id in &effects.enabled {
            if !seen.insert(id) {
                return Err(ConfigError::Invalid(format!(
                    "Effect {} is enabled more than once",
                    id
                )));
            }
        }

        // Critical effects must also be enabled
        if let Some(id) = effects.critical.iter().find(|id| !seen.contains(id)) {
            return Err(ConfigError::Invalid(format!(
                "Critical effect {} is not enabled",
                id
            )));
        }

        Ok(())
    }

    fn validate_memory(memory: &MemoryConfig) -> Result<(), ConfigError> {
        if memory.max_read_size == 0 {
            return Err(ConfigError::Invalid(
                "Maximum read size must be greater than 0".to_string(),
            ));
        }

        if memory.max_read_size > 104857600 {
            warn!(max_read_size = memory.max_read_size, "maximum read size exceeds 100MB");
        }

        Ok(())
    }

    fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                logging.level, valid_levels
            )));
        }
        Ok(())
    }
}

/// Validates a configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    ConfigValidator::validate(config)
}
