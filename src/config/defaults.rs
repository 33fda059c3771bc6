//! Default configuration values

use serde::{Deserialize, Serialize};

/// Default configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDefaults {
    pub target: TargetDefaults,
    pub effects: EffectsDefaults,
    pub memory: MemoryDefaults,
    pub logging: LoggingDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDefaults {
    pub process: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectsDefaults {
    pub enabled: Vec<u32>,
    pub critical: Vec<u32>,
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDefaults {
    pub max_read_size: usize,
    pub verify_writes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingDefaults {
    pub level: String,
}

/// Returns the default configuration
pub fn default_config() -> ConfigDefaults {
    ConfigDefaults {
        target: TargetDefaults {
            process: "dxhr.exe".to_string(),
        },
        effects: EffectsDefaults {
            enabled: Vec::new(),
            critical: Vec::new(),
            tick_interval_ms: 250,
        },
        memory: MemoryDefaults {
            max_read_size: 1048576, // 1MB
            verify_writes: true,
        },
        logging: LoggingDefaults {
            level: "info".to_string(),
        },
    }
}
