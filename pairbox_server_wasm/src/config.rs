//! Environment-driven server configuration

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Snapshot file used when `PAIRBOX_STATE_FILE` is unset
pub const DEFAULT_STATE_FILE: &str = "pairbox_state.json";

/// Idle timeout used when `PAIRBOX_IDLE_TIMEOUT_SECS` is unset or invalid
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(45);

/// Runtime settings for the signaling server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Where server state is handed between component instances.
    /// `None` keeps state in process memory only.
    pub state_file: Option<PathBuf>,
    /// A connection that neither polls nor sends for this long is disconnected
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            state_file: Some(PathBuf::from(DEFAULT_STATE_FILE)),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Config with no snapshot file, for hosts that keep one instance alive.
    pub fn in_memory() -> Self {
        Self {
            state_file: None,
            ..Self::default()
        }
    }

    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let state_file = match lookup("PAIRBOX_STATE_FILE") {
            Some(path) if path.trim().is_empty() => None,
            Some(path) => Some(PathBuf::from(path)),
            None => Some(PathBuf::from(DEFAULT_STATE_FILE)),
        };

        let idle_timeout = match lookup("PAIRBOX_IDLE_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    warn!(value = %raw, "Invalid PAIRBOX_IDLE_TIMEOUT_SECS, using default");
                    DEFAULT_IDLE_TIMEOUT
                }
            },
            None => DEFAULT_IDLE_TIMEOUT,
        };

        Self {
            state_file,
            idle_timeout,
        }
    }
}
