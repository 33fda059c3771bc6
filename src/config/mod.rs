//! Configuration module
//!
//! Provides configuration loading, validation, and default settings
//! for the memfx command line tool.

mod defaults;
mod loader;
mod validator;

pub use defaults::{default_config, ConfigDefaults};
pub use loader::{
    load_config, Config, ConfigError, ConfigLoader, EffectsConfig, LoggingConfig, MemoryConfig,
    TargetConfig,
};
pub use validator::{validate_config, ConfigValidator};

// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;
