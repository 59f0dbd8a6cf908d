//! Configuration validation utilities.

use std::time::Duration;

use thiserror::Error;

use crate::sensor::SensorError;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Failed to parse JSON configuration.
    #[error("failed to parse JSON config: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),

    /// A sensor definition failed to parse.
    #[error("sensor '{name}': {source}")]
    Sensor {
        name: String,
        #[source]
        source: SensorError,
    },
}

/// Parse duration string using humantime.
///
/// Supports various formats: `30s`, `1m`, `5m30s`, `1h`, `2h30m`, `1d`, `100ms`, etc.
///
/// # Examples
///
/// ```
/// use sensorium::config::parse_duration;
///
/// // Per-check timeouts and the shutdown grace period use this form.
/// assert_eq!(parse_duration("750ms").unwrap().as_millis(), 750);
/// assert_eq!(parse_duration(" 2s ").unwrap().as_secs(), 2);
/// assert!(parse_duration("").is_err());
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Substitute `${VAR}` and `${VAR:-default}` references in raw config text.
///
/// Unset variables without a default become empty. Bare `$1`-style text (as
/// in `awk` programs inside a check command) is left untouched.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    regex
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .into_owned()
}
