//! Poller Layer
//!
//! Runs each ready sensor's check on its interval and feeds the numeric
//! reading into the sensor's collector. Every sensor gets its own Tokio task;
//! a bad reading or failed command only costs that sensor one interval.
//!
//! # Architecture
//!
//! - [`CheckRunner`]: executes a check command (default: [`CommandRunner`])
//! - [`SensorPoller`]: the per-sensor loop (`idle → running → updating → idle`)
//! - [`SensorRegistry`]: registers collectors, spawns pollers, shuts them down
//!
//! # Example
//!
//! ```rust,no_run
//! use sensorium::{Sensor, SensorRegistry};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sensor = Sensor::new("disk_free_bytes", "gauge").with_check(["/usr/local/bin/df.sh"]);
//! sensor.parse()?;
//!
//! let registry = SensorRegistry::new(prometheus::Registry::new());
//! registry.spawn(&sensor).await?;
//! // ...
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod check;
mod registry;
mod task;

pub use check::{CheckRunner, CommandRunner, parse_reading};
pub use registry::{DEFAULT_SHUTDOWN_TIMEOUT, SensorInfo, SensorRegistry};
pub use task::{SensorPoller, SensorStatus, apply_reading};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::sensor::UpdateError;

/// Errors from a single poll tick. None of them stop the poll loop.
#[derive(Debug, Error)]
pub enum PollError {
    /// The check command could not be started or awaited.
    #[error("failed to run check '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The check did not finish in time.
    #[error("check timed out after {0:?}")]
    Timeout(Duration),

    /// The check exited unsuccessfully.
    #[error("check exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    /// The check output is not a single finite number.
    #[error("check output {output:?} is not a reading: {reason}")]
    Parse { output: String, reason: String },

    /// The collector refused the reading.
    #[error("reading rejected: {0}")]
    Rejected(#[from] UpdateError),
}

impl PollError {
    /// Whether the command itself failed (spawn, timeout, exit status).
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::Timeout(_) | Self::Exit { .. })
    }

    /// Whether the command ran but its output could not be applied.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Rejected(_))
    }
}

/// Errors from registering or spawning sensors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The sensor has not been parsed.
    #[error("sensor '{0}' has no collector; parse it before spawning")]
    NotReady(String),

    /// A sensor with the same fully-qualified name is already running.
    #[error("sensor '{0}' is already registered")]
    Duplicate(String),

    /// No sensor with this name is registered.
    #[error("sensor '{0}' is not registered")]
    NotFound(String),

    /// The metrics registry refused the collector.
    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Lifecycle state of one poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PollerState {
    /// Waiting for the next tick.
    Idle,
    /// The check command is executing.
    Running,
    /// A reading is being applied to the collector.
    Updating,
    /// Shut down; terminal.
    Stopped,
}

/// When a poller fires for the first time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstTick {
    /// Run the check as soon as the poller starts.
    #[default]
    Immediate,
    /// Wait one full interval first.
    AfterInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_error_classification() {
        assert!(PollError::Timeout(Duration::from_secs(1)).is_execution());
        assert!(
            PollError::Exit {
                status: "exit status: 1".to_string(),
                stderr: String::new(),
            }
            .is_execution()
        );

        let parse = PollError::Parse {
            output: "abc".to_string(),
            reason: "invalid float literal".to_string(),
        };
        assert!(parse.is_parse());
        assert!(!parse.is_execution());
        assert!(PollError::from(UpdateError::NegativeDelta(-1.0)).is_parse());
    }

    #[test]
    fn test_first_tick_serde() {
        let tick: FirstTick = serde_yaml::from_str("after_interval").unwrap();
        assert_eq!(tick, FirstTick::AfterInterval);
        assert_eq!(FirstTick::default(), FirstTick::Immediate);
    }

    #[test]
    fn test_poller_state_display() {
        assert_eq!(PollerState::Updating.to_string(), "updating");
        assert_eq!(serde_json::to_string(&PollerState::Stopped).unwrap(), "\"stopped\"");
    }
}
