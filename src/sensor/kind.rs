//! Metric kinds and update policies.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use super::SensorError;

/// Statistical family of a sensor's metric.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MetricKind {
    /// Monotonically increasing accumulator.
    Counter,
    /// Arbitrary up/down value.
    Gauge,
    /// Distribution over bucket boundaries.
    Histogram,
    /// Distribution over quantile objectives.
    Summary,
}

impl MetricKind {
    /// Every recognized kind, in declaration order.
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Counter,
        MetricKind::Gauge,
        MetricKind::Histogram,
        MetricKind::Summary,
    ];

    /// Resolve a configuration literal, ignoring surrounding whitespace and
    /// ASCII case.
    ///
    /// # Errors
    /// Returns [`SensorError::InvalidKind`] carrying the literal as given.
    pub fn from_literal(literal: &str) -> Result<Self, SensorError> {
        literal
            .trim()
            .parse()
            .map_err(|_| SensorError::InvalidKind {
                value: literal.to_string(),
            })
    }
}

/// How a gauge applies each reading.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GaugeMode {
    /// Replace the value with the reading.
    #[default]
    Set,
    /// Treat the reading as a signed delta.
    Add,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_literal_recognized() {
        assert_eq!(MetricKind::from_literal("counter").unwrap(), MetricKind::Counter);
        assert_eq!(MetricKind::from_literal("gauge").unwrap(), MetricKind::Gauge);
        assert_eq!(MetricKind::from_literal("histogram").unwrap(), MetricKind::Histogram);
        assert_eq!(MetricKind::from_literal("summary").unwrap(), MetricKind::Summary);
    }

    #[test]
    fn test_from_literal_normalizes() {
        assert_eq!(MetricKind::from_literal(" Gauge\n").unwrap(), MetricKind::Gauge);
        assert_eq!(MetricKind::from_literal("HISTOGRAM").unwrap(), MetricKind::Histogram);
    }

    #[test]
    fn test_from_literal_unknown() {
        let err = MetricKind::from_literal("nonsense").unwrap_err();
        assert_eq!(err.field(), "type");
        assert!(err.to_string().contains("nonsense"));

        assert!(MetricKind::from_literal("").is_err());
        assert!(MetricKind::from_literal("counters").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for kind in MetricKind::ALL {
            assert_eq!(MetricKind::from_literal(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn test_gauge_mode_serde() {
        let mode: GaugeMode = serde_json::from_str("\"add\"").unwrap();
        assert_eq!(mode, GaugeMode::Add);
        assert_eq!(GaugeMode::default(), GaugeMode::Set);
    }
}
