//! Sensor definition files and bulk parsing.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use super::validation::{ConfigError, expand_env_vars};
use crate::sensor::Sensor;

/// Contents of one sensor include file: a bare list, or a `sensors` table.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SensorFile {
    List(Vec<Sensor>),
    Table { sensors: Vec<Sensor> },
}

impl SensorFile {
    fn into_sensors(self) -> Vec<Sensor> {
        match self {
            Self::List(sensors) | Self::Table { sensors } => sensors,
        }
    }
}

/// Load sensor definitions from every `.json`, `.yaml` and `.yml` file in a
/// directory, in file name order.
pub fn load_sensor_dir(dir_path: impl AsRef<Path>) -> Result<Vec<Sensor>, ConfigError> {
    let dir = dir_path.as_ref();
    if !dir.exists() {
        return Err(ConfigError::ValidationError(format!(
            "sensor_path '{}' does not exist",
            dir.display()
        )));
    }
    if !dir.is_dir() {
        return Err(ConfigError::ValidationError(format!(
            "sensor_path '{}' is not a directory",
            dir.display()
        )));
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut sensors = Vec::new();
    for path in paths {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !matches!(ext, "json" | "yaml" | "yml") {
            continue;
        }

        tracing::debug!("Loading sensors from: {}", path.display());
        let content = expand_env_vars(&std::fs::read_to_string(&path)?);
        let file: SensorFile = if ext == "json" {
            serde_json::from_str(&content).map_err(|e| {
                ConfigError::ValidationError(format!("failed to parse '{}': {}", path.display(), e))
            })?
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                ConfigError::ValidationError(format!("failed to parse '{}': {}", path.display(), e))
            })?
        };
        sensors.extend(file.into_sensors());
    }

    Ok(sensors)
}

/// Structural checks across a set of sensors: non-empty, unique
/// fully-qualified names. The identifier grammar is left to [`Sensor::parse`].
pub fn validate_sensors(sensors: &[Sensor]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for sensor in sensors {
        if sensor.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "sensor name cannot be empty".to_string(),
            ));
        }
        let fq_name = sensor.fq_name();
        if !seen.insert(fq_name.clone()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate sensor name: '{fq_name}'"
            )));
        }
    }
    Ok(())
}

/// Parse every sensor.
///
/// With `skip_invalid`, sensors that fail are logged and dropped; otherwise
/// the first failure is returned.
pub fn parse_sensors(sensors: Vec<Sensor>, skip_invalid: bool) -> Result<Vec<Sensor>, ConfigError> {
    let mut ready = Vec::with_capacity(sensors.len());
    for mut sensor in sensors {
        match sensor.parse() {
            Ok(()) => ready.push(sensor),
            Err(e) if skip_invalid => {
                tracing::warn!(
                    sensor = %sensor.fq_name(),
                    field = e.field(),
                    error = %e,
                    "Skipping invalid sensor"
                );
            }
            Err(source) => {
                return Err(ConfigError::Sensor {
                    name: sensor.fq_name(),
                    source,
                });
            }
        }
    }
    Ok(ready)
}
