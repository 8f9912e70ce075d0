//! Configuration structures for the capture daemon.
//!
//! Supports TOML deserialization with defaults matching the behaviour of
//! the plain command-line invocation (`hw-timestamper <iface>`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default number of slots in the timestamp channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default output file name.
pub const DEFAULT_OUTPUT: &str = "Test.csv";

/// Top-level capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Output log path (truncated on start).
    pub output: PathBuf,

    /// Number of slots in the timestamp channel (power of two).
    pub channel_capacity: usize,

    /// Interval between status lines from the supervising thread.
    #[serde(with = "humantime_serde")]
    pub status_interval: Duration,

    /// Capture socket settings.
    pub capture: SocketSettings,

    /// Log worker settings.
    pub logging: LogSettings,

    /// Idle behaviour of both workers.
    pub wait: WaitSettings,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            status_interval: Duration::from_secs(10),
            capture: SocketSettings::default(),
            logging: LogSettings::default(),
            wait: WaitSettings::default(),
        }
    }
}

/// Capture socket and capture worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketSettings {
    /// Put the interface into promiscuous mode.
    pub promiscuous: bool,

    /// Clear the promiscuous flag again on shutdown.
    pub restore_promiscuous: bool,

    /// Size of the frame receive buffer in bytes.
    pub recv_buffer_size: usize,

    /// CPU to pin the capture worker to.
    pub capture_cpu: Option<usize>,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            promiscuous: true,
            restore_promiscuous: false,
            recv_buffer_size: 4096,
            capture_cpu: None,
        }
    }
}

/// Log worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Keep logging buffered records after shutdown until the channel is
    /// empty. When false the worker stops at the next empty poll.
    pub drain_on_shutdown: bool,

    /// CPU to pin the log worker to.
    pub log_cpu: Option<usize>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            drain_on_shutdown: true,
            log_cpu: None,
        }
    }
}

/// Wait settings wrapper so the TOML reads `[wait] strategy = ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WaitSettings {
    /// What a worker does when it finds no work.
    pub strategy: WaitConfig,
}

/// Idle behaviour for a polling worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WaitConfig {
    /// Spin with a CPU hint. Lowest latency, one core per worker.
    #[default]
    BusyPoll,
    /// Yield the time slice to the OS scheduler.
    Yield,
    /// Sleep for a bounded duration.
    Sleep(#[serde(with = "humantime_serde")] Duration),
}

impl fmt::Display for WaitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusyPoll => write!(f, "busy"),
            Self::Yield => write!(f, "yield"),
            Self::Sleep(d) => write!(f, "sleep:{}", humantime::format_duration(*d)),
        }
    }
}

impl FromStr for WaitConfig {
    type Err = ConfigError;

    /// Parse `busy`, `yield`, or `sleep:<duration>` (e.g. `sleep:100us`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "busy" | "busy_poll" => Ok(Self::BusyPoll),
            "yield" => Ok(Self::Yield),
            other => {
                let Some(duration) = other.strip_prefix("sleep:") else {
                    return Err(ConfigError::Invalid(format!(
                        "unknown wait strategy '{other}' (expected busy, yield or sleep:<duration>)"
                    )));
                };
                humantime::parse_duration(duration)
                    .map(Self::Sleep)
                    .map_err(|e| ConfigError::Invalid(format!("bad sleep duration '{duration}': {e}")))
            }
        }
    }
}

impl CaptureConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check values that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a channel capacity that is not
    /// a power of two (or below 2) and for a zero receive buffer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity < 2 || !self.channel_capacity.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "channel_capacity must be a power of two >= 2, got {}",
                self.channel_capacity
            )));
        }
        if self.capture.recv_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "capture.recv_buffer_size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value outside its allowed range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
