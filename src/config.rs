//! Configuration module for sensorium.
//!
//! Provides YAML/JSON configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Poller settings (first tick, invalid sensor policy, shutdown timeout)
//! - Sensor definitions, inline or from an include directory

mod app;
mod sensors;
mod validation;

pub use app::{AppConfig, DEFAULT_PORT, ServerConfig, TelemetryConfig};
pub use sensors::{load_sensor_dir, parse_sensors, validate_sensors};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
