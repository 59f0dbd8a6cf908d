//! Application configuration structures.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::sensors::{load_sensor_dir, validate_sensors};
use super::validation::{ConfigError, expand_env_vars};
use crate::poller::{DEFAULT_SHUTDOWN_TIMEOUT, FirstTick};
use crate::sensor::Sensor;

// =============================================================================
// Constants
// =============================================================================

/// Default exposition port.
pub const DEFAULT_PORT: u16 = 9090;

fn default_shutdown_timeout() -> Duration {
    DEFAULT_SHUTDOWN_TIMEOUT
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Exposition server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 9090).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// =============================================================================
// Telemetry Configuration
// =============================================================================

/// Poller behavior shared by all sensors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// When each poller runs its first check (default: immediate).
    #[serde(default)]
    pub first_tick: FirstTick,

    /// Log and skip sensors that fail to parse instead of aborting (default: false).
    #[serde(default)]
    pub skip_invalid: bool,

    /// How long shutdown waits for in-flight checks (default: 5s).
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            first_tick: FirstTick::default(),
            skip_invalid: false,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Exposition server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Poller configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Inline sensor definitions.
    #[serde(default)]
    pub sensors: Vec<Sensor>,

    /// Path to a directory with additional sensor files.
    #[serde(default)]
    pub sensor_path: Option<String>,
}

impl AppConfig {
    /// Load configuration from a YAML or JSON file (chosen by extension).
    ///
    /// Environment references (`${VAR}`, `${VAR:-default}`) are expanded
    /// before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = expand_env_vars(&std::fs::read_to_string(path)?);
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration including the `sensor_path` directory.
    ///
    /// Sensors from the directory are appended after the inline ones.
    pub fn load_with_sensor_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;

        if let Some(ref sensor_dir) = config.sensor_path {
            let additional = load_sensor_dir(sensor_dir)?;
            config.sensors.extend(additional);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate server bind address
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        // Validate server port
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        validate_sensors(&self.sensors)?;

        Ok(())
    }
}
