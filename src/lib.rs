//! Sensorium - declarative sensors for Prometheus
//!
//! A sensor names a metric, declares its kind (counter, gauge, histogram,
//! summary) and names an external command whose output feeds the metric on a
//! fixed interval. This crate validates sensor definitions, builds typed
//! collectors for them, polls their checks and serves the result for scraping.
//!
//! # Architecture
//!
//! - **Sensors**: definition decoding, name/kind validation, typed collectors
//! - **Poller**: per-sensor check loop and the registry that runs them
//! - **Config**: YAML/JSON application config and sensor include directories
//! - **Server**: `/metrics` exposition, liveness and sensor status
//!
//! # Example
//!
//! ```rust
//! use sensorium::{MetricKind, Sensor};
//!
//! let json = r#"{
//!     "namespace": "namespace_text",
//!     "subsystem": "subsystem_text",
//!     "name": "sensor_counter",
//!     "help": "help text",
//!     "type": "counter",
//!     "poll": 10,
//!     "check": ["/bin/sensor.sh"]
//! }"#;
//!
//! let mut sensor: Sensor = serde_json::from_str(json).unwrap();
//! sensor.parse().unwrap();
//! assert_eq!(sensor.metric_kind(), Some(MetricKind::Counter));
//! ```

pub mod config;
pub mod poller;
pub mod sensor;
pub mod server;

pub use config::{AppConfig, ConfigError};
pub use poller::{
    CheckRunner, CommandRunner, FirstTick, PollError, PollerState, RegistryError, SensorPoller,
    SensorRegistry, SensorStatus,
};
pub use sensor::{
    CollectorOptions, GaugeMode, MetricIdentity, MetricKind, Sensor, SensorCollector,
    SensorError, UpdateError,
};
