//! NETORB - Network Load Rust Bench
//!
//! A rate-controlled, time-bounded load generation harness: a pool of
//! concurrent workers repeats a pluggable unit of work against one target
//! until a deadline or an interrupt, while a reporter streams aggregate
//! metrics once per sampling interval.

use std::fmt;

pub mod bench;
pub mod config;
pub mod models;
pub mod output;
pub mod util;
pub mod work;

// Common error types
#[derive(Debug)]
pub enum NetOrbError {
    /// I/O operation failed
    IoError(std::io::Error),
    /// Configuration validation or parsing error
    ConfigError(String),
    /// A worker or reporter task could not be joined
    WorkerError(String),
    /// A stats sink failed to record a line
    SinkError(String),
    /// Results persistence error
    PersistenceError(String),
}

impl fmt::Display for NetOrbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetOrbError::IoError(err) => write!(f, "I/O error: {}", err),
            NetOrbError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            NetOrbError::WorkerError(msg) => write!(f, "Worker error: {}", msg),
            NetOrbError::SinkError(msg) => write!(f, "Stats sink error: {}", msg),
            NetOrbError::PersistenceError(msg) => write!(f, "Results persistence error: {}", msg),
        }
    }
}

impl std::error::Error for NetOrbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetOrbError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NetOrbError {
    fn from(err: std::io::Error) -> Self {
        NetOrbError::IoError(err)
    }
}

impl From<serde_json::Error> for NetOrbError {
    fn from(err: serde_json::Error) -> Self {
        NetOrbError::PersistenceError(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for NetOrbError {
    fn from(err: toml::de::Error) -> Self {
        NetOrbError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for NetOrbError {
    fn from(err: toml::ser::Error) -> Self {
        NetOrbError::ConfigError(format!("TOML serialization error: {}", err))
    }
}

/// Result type alias for NETORB operations
pub type Result<T> = std::result::Result<T, NetOrbError>;

/// Error handling utilities
pub mod error {
    use super::NetOrbError;

    /// Whether the error happened before any worker started.
    ///
    /// The launcher maps these to a distinct exit code.
    pub fn is_config_error(error: &NetOrbError) -> bool {
        matches!(error, NetOrbError::ConfigError(_))
    }

    /// Convert error to user-friendly message with suggestions
    pub fn user_friendly_message(error: &NetOrbError) -> String {
        match error {
            NetOrbError::ConfigError(msg) => {
                format!("Configuration error: {}. Check your flags or config file.", msg)
            }
            NetOrbError::IoError(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                "Permission denied. Check file permissions for the config, log and data directories."
                    .to_string()
            }
            NetOrbError::SinkError(_) => {
                "Failed to write the stats log. Check the log path and free disk space.".to_string()
            }
            NetOrbError::PersistenceError(_) => {
                "Failed to save results. Check disk space and permissions.".to_string()
            }
            _ => error.to_string(),
        }
    }
}

// Common types and constants
pub const APP_NAME: &str = "netorb";
pub const CONFIG_FILE: &str = "netorb.toml";
pub const RESULTS_FILE: &str = "history.json";
pub const MAX_RESULTS_HISTORY: usize = 100;
