//! Engine configuration
//!
//! Parses the `engine:`, `fields:` and `triggered_events:` sections of the
//! configuration file.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use cqc_field_store::FieldDefinition;
use cqc_trigger::{RemoteTimeouts, TriggeredEvent, TriggeredEventConfig};

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "configuration.yaml";

/// Remote query timeouts, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Timeout for `FldValEquals` live field reads
    #[serde(default = "default_field_read_timeout")]
    pub field_read_timeout: u64,

    /// Timeout for `IsDevReady` driver state queries
    #[serde(default = "default_driver_state_timeout")]
    pub driver_state_timeout: u64,
}

impl RemoteSettings {
    pub fn timeouts(&self) -> RemoteTimeouts {
        RemoteTimeouts {
            field_read: Duration::from_millis(self.field_read_timeout),
            driver_state: Duration::from_millis(self.driver_state_timeout),
        }
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            field_read_timeout: default_field_read_timeout(),
            driver_state_timeout: default_driver_state_timeout(),
        }
    }
}

/// Hours that count as night, half open and wrapping past midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightSettings {
    #[serde(default = "default_night_start")]
    pub start_hour: u32,

    #[serde(default = "default_night_end")]
    pub end_hour: u32,
}

impl NightSettings {
    /// Is `hour` inside the night window
    pub fn is_night(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

impl Default for NightSettings {
    fn default() -> Self {
        Self {
            start_hour: default_night_start(),
            end_hour: default_night_end(),
        }
    }
}

/// Event bus settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBusSettings {
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

impl Default for EventBusSettings {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

/// The `engine:` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub night: NightSettings,

    #[serde(default)]
    pub event_bus: EventBusSettings,
}

fn default_field_read_timeout() -> u64 {
    5000
}

fn default_driver_state_timeout() -> u64 {
    2500
}

fn default_night_start() -> u32 {
    22
}

fn default_night_end() -> u32 {
    6
}

fn default_bus_capacity() -> usize {
    1024
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub fields: Vec<FieldDefinition>,

    #[serde(default)]
    pub triggered_events: Vec<TriggeredEventConfig>,
}

impl EngineConfig {
    /// Load and validate configuration from a config directory
    pub fn load(config_dir: impl AsRef<Path>, file: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        let file = file.as_ref();
        let yaml = load_yaml(config_dir, file)?;

        let config = Self::from_yaml(yaml).map_err(|e| match e {
            ConfigError::Deserialize { source, .. } => ConfigError::Deserialize {
                path: config_dir.join(file),
                source,
            },
            other => other,
        })?;
        config.validate()?;

        info!(
            fields = config.fields.len(),
            triggered_events = config.triggered_events.len(),
            "Loaded engine configuration"
        );
        Ok(config)
    }

    /// Parse configuration from a processed YAML value
    pub fn from_yaml(yaml: Value) -> ConfigResult<Self> {
        if yaml.is_null() {
            return Ok(Self::default());
        }
        if !yaml.is_mapping() {
            return Err(ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: "configuration must be a mapping".to_string(),
            });
        }

        serde_yaml::from_value(yaml).map_err(|source| ConfigError::Deserialize {
            path: Path::new(DEFAULT_CONFIG_FILE).to_path_buf(),
            source,
        })
    }

    /// Check settings ranges and every triggered event's filters
    pub fn validate(&self) -> ConfigResult<()> {
        let night = &self.engine.night;
        if night.start_hour > 23 || night.end_hour > 23 {
            return Err(ConfigError::ValidationFailed {
                message: format!(
                    "night hours must be 0-23, got {}-{}",
                    night.start_hour, night.end_hour
                ),
            });
        }
        if self.engine.event_bus.capacity == 0 {
            return Err(ConfigError::ValidationFailed {
                message: "event bus capacity must be at least 1".to_string(),
            });
        }

        for (i, config) in self.triggered_events.iter().enumerate() {
            TriggeredEvent::from_config(config).map_err(|e| ConfigError::InvalidValue {
                key: format!(
                    "triggered_events[{}]{}",
                    i,
                    config
                        .id
                        .as_deref()
                        .map(|id| format!(" ({id})"))
                        .unwrap_or_default()
                ),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_yaml(Value::Null).unwrap();
        assert_eq!(config.engine.remote.field_read_timeout, 5000);
        assert_eq!(config.engine.night.start_hour, 22);
        assert_eq!(config.engine.event_bus.capacity, 1024);
        assert!(config.fields.is_empty());
    }

    #[test]
    fn test_night_window() {
        let overnight = NightSettings {
            start_hour: 22,
            end_hour: 6,
        };
        assert!(overnight.is_night(23));
        assert!(overnight.is_night(0));
        assert!(!overnight.is_night(6));
        assert!(!overnight.is_night(12));

        let daytime = NightSettings {
            start_hour: 1,
            end_hour: 5,
        };
        assert!(daytime.is_night(1));
        assert!(!daytime.is_night(5));
    }

    #[test]
    fn test_timeouts() {
        let remote = RemoteSettings {
            field_read_timeout: 1500,
            driver_state_timeout: 300,
        };
        let t = remote.timeouts();
        assert_eq!(t.field_read, Duration::from_millis(1500));
        assert_eq!(t.driver_state, Duration::from_millis(300));
    }

    #[test]
    fn test_root_must_be_mapping() {
        let yaml: Value = serde_yaml::from_str("- a\n- b\n").unwrap();
        assert!(matches!(
            EngineConfig::from_yaml(yaml),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = EngineConfig::default();
        config.engine.night.end_hour = 24;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed { .. })
        ));

        let mut config = EngineConfig::default();
        config.engine.event_bus.capacity = 0;
        assert!(config.validate().is_err());
    }
}
