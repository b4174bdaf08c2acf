//! Configuration management module
//!
//! Handles loading, saving, and validation of run configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{NetOrbError, Result, APP_NAME, CONFIG_FILE};

pub mod persistence;

/// Run configuration containing all load parameters
///
/// Immutable once a run starts: the coordinator takes it by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Target descriptor: `host:port` for TCP, a URL for HTTP
    pub target: String,
    /// Which probe each worker repeats
    pub mode: WorkMode,
    /// Number of concurrent workers
    pub concurrency: usize,
    /// Total run time before the deadline fires
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Optional per-worker rate limit in operations per second
    pub rate_limit: Option<f64>,
    /// Upper bound on a single unit of work
    #[serde(with = "humantime_serde")]
    pub work_timeout: Duration,
    /// Stats reporter sampling period
    #[serde(with = "humantime_serde")]
    pub sample_interval: Duration,
    /// Bytes written per TCP connection (0 = connect only)
    pub payload_size: u64,
    /// Optional append-only stats log
    pub stats_log: Option<PathBuf>,
}

/// Work mode variants selecting the shipped probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WorkMode {
    /// Open a TCP connection, optionally write a payload, close
    TcpConnect,
    /// Issue an HTTP GET and read the response body
    Http,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            mode: WorkMode::TcpConnect,
            concurrency: 10,
            duration: Duration::from_secs(30),
            rate_limit: None,
            work_timeout: Duration::from_secs(5),
            sample_interval: Duration::from_secs(1),
            payload_size: 0,
            stats_log: None,
        }
    }
}

const MAX_PAYLOAD_SIZE: u64 = 64 * 1024 * 1024; // 64 MiB

impl RunConfig {
    /// Create a new run configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a TCP connect run against `host:port`
    pub fn tcp_connect(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            mode: WorkMode::TcpConnect,
            ..Self::default()
        }
    }

    /// Configuration for an HTTP GET run against a URL
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            target: url.into(),
            mode: WorkMode::Http,
            ..Self::default()
        }
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(NetOrbError::ConfigError("Target must be specified".to_string()));
        }

        match self.mode {
            WorkMode::TcpConnect => validate_socket_target(&self.target)?,
            WorkMode::Http => validate_url_target(&self.target)?,
        }

        if self.concurrency == 0 {
            return Err(NetOrbError::ConfigError(
                "Concurrency must be at least 1".to_string(),
            ));
        }

        if let Some(rate) = self.rate_limit {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(NetOrbError::ConfigError(format!(
                    "Rate limit must be a positive number of operations per second, got {}",
                    rate
                )));
            }

            // The pacing period 1/rate must be representable
            if Duration::try_from_secs_f64(1.0 / rate).is_err() {
                return Err(NetOrbError::ConfigError(format!(
                    "Rate limit {} is too small to pace",
                    rate
                )));
            }
        }

        if self.work_timeout.is_zero() {
            return Err(NetOrbError::ConfigError(
                "Work timeout must be greater than 0".to_string(),
            ));
        }

        if self.sample_interval.is_zero() {
            return Err(NetOrbError::ConfigError(
                "Sample interval must be greater than 0".to_string(),
            ));
        }

        if self.payload_size > MAX_PAYLOAD_SIZE {
            return Err(NetOrbError::ConfigError(format!(
                "Payload too large: {} bytes (max: {} bytes)",
                self.payload_size, MAX_PAYLOAD_SIZE
            )));
        }

        if self.payload_size > 0 && self.mode != WorkMode::TcpConnect {
            return Err(NetOrbError::ConfigError(
                "Payload size only applies to tcp-connect mode".to_string(),
            ));
        }

        Ok(())
    }

    /// Set the target descriptor
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Set the work mode
    pub fn with_mode(mut self, mode: WorkMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the number of workers
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the run duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the per-worker rate limit
    pub fn with_rate_limit(mut self, rate: Option<f64>) -> Self {
        self.rate_limit = rate;
        self
    }

    /// Set the per-item work timeout
    pub fn with_work_timeout(mut self, timeout: Duration) -> Self {
        self.work_timeout = timeout;
        self
    }

    /// Set the reporter sampling interval
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Set the TCP payload size
    pub fn with_payload_size(mut self, size: u64) -> Self {
        self.payload_size = size;
        self
    }

    /// Set the stats log path
    pub fn with_stats_log(mut self, path: Option<PathBuf>) -> Self {
        self.stats_log = path;
        self
    }

    /// Load configuration from the standard config file location
    /// Returns default configuration if file doesn't exist
    ///
    /// The loaded file is not validated here: CLI flags may still fill in
    /// missing fields such as the target.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, defaulting when absent
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| {
            NetOrbError::ConfigError(format!(
                "Failed to read config file {}: {}",
                config_path.display(),
                e
            ))
        })?;

        toml::from_str(&content).map_err(|e| {
            NetOrbError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                config_path.display(),
                e
            ))
        })
    }

    /// Save configuration to the standard config file location
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_file_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                NetOrbError::ConfigError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = self.to_toml()?;

        fs::write(config_path, content).map_err(|e| {
            NetOrbError::ConfigError(format!(
                "Failed to write config file {}: {}",
                config_path.display(),
                e
            ))
        })
    }

    /// Render the configuration as pretty TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the standard configuration file path
    /// Uses $CONFIG_HOME/netorb/netorb.toml
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            NetOrbError::ConfigError("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

impl WorkMode {
    /// Get a human-readable description of the mode
    pub fn description(&self) -> &'static str {
        match self {
            WorkMode::TcpConnect => "TCP Connect",
            WorkMode::Http => "HTTP GET",
        }
    }
}

fn validate_socket_target(target: &str) -> Result<()> {
    let (host, port) = target.rsplit_once(':').ok_or_else(|| {
        NetOrbError::ConfigError(format!("TCP target must be host:port, got {}", target))
    })?;

    if host.trim_matches(|c| c == '[' || c == ']').is_empty() {
        return Err(NetOrbError::ConfigError(format!(
            "TCP target is missing a host: {}",
            target
        )));
    }

    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(NetOrbError::ConfigError(format!(
            "TCP target has an invalid port: {}",
            target
        ))),
        Ok(_) => Ok(()),
    }
}

fn validate_url_target(target: &str) -> Result<()> {
    let url = reqwest::Url::parse(target)
        .map_err(|e| NetOrbError::ConfigError(format!("Invalid URL {}: {}", target, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(NetOrbError::ConfigError(format!(
            "Unsupported URL scheme {} (expected http or https)",
            other
        ))),
    }
}

// Durations are stored as human-readable strings ("30s", "1m 30s")
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
