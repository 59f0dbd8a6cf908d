//! Sensor definitions
//!
//! A sensor names a metric, declares its kind and names the external command
//! that feeds it. Decoding a record (serde) and validating it
//! ([`Sensor::parse`]) are separate steps; only a parsed sensor carries a
//! collector.
//!
//! - [`validate_identity`]: identifier grammar for metric names
//! - [`MetricKind`]: the four metric families
//! - [`create_collector`]: typed collector construction
//! - [`Sensor`]: the definition and its parse step

mod definition;
mod factory;
mod kind;
mod naming;
mod summary;

pub use definition::{DEFAULT_POLL, MAX_POLL, MIN_POLL, Sensor};
pub use factory::{
    CollectorOptions, CounterHandle, GaugeHandle, HistogramHandle, SensorCollector, SummaryHandle,
    build_collector, create_collector,
};
pub use kind::{GaugeMode, MetricKind};
pub use naming::{MetricIdentity, validate_identity};
pub use summary::{DEFAULT_MAX_AGE, DEFAULT_MAX_SAMPLES, DEFAULT_QUANTILES, Summary};

use thiserror::Error;

/// Errors raised while validating a sensor definition.
///
/// Each variant is attributable to one configuration field, see [`SensorError::field`].
#[derive(Debug, Error)]
pub enum SensorError {
    /// A name part violates the identifier grammar.
    #[error("invalid metric {field} '{value}': {reason}")]
    InvalidName {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// The `type` literal is not a known metric kind.
    #[error("invalid sensor type '{value}': expected one of counter, gauge, histogram, summary")]
    InvalidKind { value: String },

    /// The check command is missing or malformed.
    #[error("invalid check {value:?}: {reason}")]
    InvalidCheck { value: Vec<String>, reason: String },

    /// The poll interval is not a number of seconds within the accepted range.
    #[error(
        "invalid poll interval {value}: must be between {} and {} seconds",
        MIN_POLL.as_secs_f64(),
        MAX_POLL.as_secs_f64()
    )]
    InvalidPoll { value: f64 },

    /// A kind-specific or timing option is malformed.
    #[error("invalid {field}: {reason}")]
    InvalidOption { field: &'static str, reason: String },

    /// The metrics library refused to build the collector.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl SensorError {
    /// Configuration field responsible for this error.
    pub fn field(&self) -> &str {
        match self {
            Self::InvalidName { field, .. } => *field,
            Self::InvalidKind { .. } => "type",
            Self::InvalidCheck { .. } => "check",
            Self::InvalidPoll { .. } => "poll",
            Self::InvalidOption { field, .. } => *field,
            Self::Metrics(_) => "collector",
        }
    }
}

/// An update a collector refused to apply.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum UpdateError {
    #[error("counter cannot decrease (delta {0})")]
    NegativeDelta(f64),

    #[error("value {0} is not finite")]
    NonFinite(f64),
}
