//! YAML configuration loading for the CQC trigger engine
//!
//! This crate loads the engine's YAML configuration with support for a few
//! custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!include_dir_merge_list dir` - Merge lists from all YAML files
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use cqc_config::EngineConfig;
//!
//! let config = EngineConfig::load("/etc/cqc", "configuration.yaml")?;
//! for event in &config.triggered_events {
//!     println!("{:?}", event.id);
//! }
//! ```

mod engine_config;
mod error;
mod loader;

pub use engine_config::{
    EngineConfig, EngineSettings, EventBusSettings, NightSettings, RemoteSettings,
    DEFAULT_CONFIG_FILE,
};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, YamlLoader};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
