//! Driver connection state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a driver instance as reported by its server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    #[default]
    NotLoaded,
    Loaded,
    WaitInit,
    WaitConfig,
    WaitCommRes,
    WaitConnect,
    Connected,
}

impl DriverState {
    /// Is the driver online and talking to its device
    pub fn is_ready(self) -> bool {
        self == DriverState::Connected
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DriverState::NotLoaded => "not_loaded",
            DriverState::Loaded => "loaded",
            DriverState::WaitInit => "wait_init",
            DriverState::WaitConfig => "wait_config",
            DriverState::WaitCommRes => "wait_comm_res",
            DriverState::WaitConnect => "wait_connect",
            DriverState::Connected => "connected",
        };
        f.write_str(text)
    }
}
