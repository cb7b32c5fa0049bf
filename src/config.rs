//! # Configuration Management
//!
//! Centralized configuration for a strap connection.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()` (prefix `WHOOP_PROTOCOL_`)
//!
//! Durations are written as milliseconds and log levels as lowercase strings.

use crate::error::{ProtocolError, Result};
use crate::protocol::handshake::KeyDerivation;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Default file the historical byte stream is written to
pub const DEFAULT_HISTORY_FILE: &str = "historical_data_stream.bin";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProtocolConfig {
    /// Handshake, timeout and polling settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Historical download settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ProtocolConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(ms) = std::env::var("WHOOP_PROTOCOL_HANDSHAKE_TIMEOUT_MS") {
            config.session.handshake_timeout = parse_millis("HANDSHAKE_TIMEOUT_MS", &ms)?;
        }

        if let Ok(ms) = std::env::var("WHOOP_PROTOCOL_BOUNDARY_TIMEOUT_MS") {
            config.session.boundary_timeout = parse_millis("BOUNDARY_TIMEOUT_MS", &ms)?;
        }

        if let Ok(ms) = std::env::var("WHOOP_PROTOCOL_WRITE_TIMEOUT_MS") {
            config.session.write_timeout = parse_millis("WRITE_TIMEOUT_MS", &ms)?;
        }

        if let Ok(ms) = std::env::var("WHOOP_PROTOCOL_BATTERY_POLL_MS") {
            config.session.battery_poll_interval = parse_millis("BATTERY_POLL_MS", &ms)?;
        }

        if let Ok(path) = std::env::var("WHOOP_PROTOCOL_HISTORY_FILE") {
            config.history.output_path = PathBuf::from(path);
        }

        if let Ok(level) = std::env::var("WHOOP_PROTOCOL_LOG_LEVEL") {
            config.logging.log_level = level.parse::<Level>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid log level: {level}"))
            })?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate every section, returning human-readable problems
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.session.validate());
        errors.extend(self.history.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_millis(name: &str, value: &str) -> Result<Duration> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ProtocolError::ConfigError(format!("Invalid {name}: '{value}'")))
}

/// Per-connection protocol settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long to wait for the session challenge
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,

    /// How long to wait for each history boundary during a download
    #[serde(with = "duration_serde")]
    pub boundary_timeout: Duration,

    /// Upper bound for a single transport write
    #[serde(with = "duration_serde")]
    pub write_timeout: Duration,

    /// Interval between battery level requests
    #[serde(with = "duration_serde")]
    pub battery_poll_interval: Duration,

    /// How the session key is built from the device serial
    pub key_derivation: KeyDerivation,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: timeout::DEFAULT_HANDSHAKE_TIMEOUT,
            boundary_timeout: timeout::DEFAULT_BOUNDARY_TIMEOUT,
            write_timeout: timeout::DEFAULT_WRITE_TIMEOUT,
            battery_poll_interval: timeout::BATTERY_POLL_INTERVAL,
            key_derivation: KeyDerivation::default(),
        }
    }
}

impl SessionConfig {
    /// Validate session configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.handshake_timeout.as_millis() < 100 {
            errors.push("Handshake timeout too short (minimum: 100ms)".to_string());
        } else if self.handshake_timeout.as_secs() > 120 {
            errors.push("Handshake timeout too long (maximum: 120s)".to_string());
        }

        if self.boundary_timeout.as_millis() < 100 {
            errors.push("Boundary timeout too short (minimum: 100ms)".to_string());
        }

        if self.write_timeout.as_millis() < 10 {
            errors.push("Write timeout too short (minimum: 10ms)".to_string());
        }

        if self.battery_poll_interval.as_secs() < 1 {
            errors.push("Battery poll interval too short (minimum: 1s)".to_string());
        }

        errors
    }
}

/// Historical download settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Where the raw historical frames are written
    pub output_path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from(DEFAULT_HISTORY_FILE),
        }
    }
}

impl HistoryConfig {
    /// Validate history configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.output_path.as_os_str().is_empty() {
            errors.push("History output path cannot be empty".to_string());
        } else if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                errors.push(format!(
                    "History output directory does not exist: {}",
                    parent.display()
                ));
            }
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("whoop-protocol"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
