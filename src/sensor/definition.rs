//! The sensor definition entity and its parse step.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::factory::{CollectorOptions, SensorCollector, build_collector};
use super::kind::{GaugeMode, MetricKind};
use super::naming::MetricIdentity;
use super::SensorError;

/// Poll interval used by [`Sensor::new`] (10 seconds).
pub const DEFAULT_POLL: Duration = Duration::from_secs(10);

/// Shortest accepted poll interval (1 millisecond).
pub const MIN_POLL: Duration = Duration::from_millis(1);

/// Longest accepted poll interval (7 days).
pub const MAX_POLL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// State bound by a successful parse.
#[derive(Debug, Clone)]
struct Bound {
    collector: SensorCollector,
    interval: Duration,
    timeout: Duration,
}

/// One sensor, as decoded from a configuration record.
///
/// A freshly decoded sensor is *unparsed*: it has no collector. A successful
/// [`Sensor::parse`] makes it *ready* by binding a typed collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    /// Optional grouping prefix.
    #[serde(default)]
    pub namespace: String,
    /// Optional grouping prefix.
    #[serde(default)]
    pub subsystem: String,
    /// Metric name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub help: String,
    /// Metric kind literal (`counter`, `gauge`, `histogram`, `summary`).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Seconds between check executions.
    #[serde(default)]
    pub poll: f64,
    /// Executable path followed by its arguments.
    #[serde(default)]
    pub check: Vec<String>,
    /// Per-check timeout (default: the poll interval).
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Histogram bucket upper bounds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<f64>>,
    /// Summary quantile objectives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantiles: Option<Vec<f64>>,
    /// How gauge readings are applied (default: set).
    #[serde(default)]
    pub mode: GaugeMode,
    #[serde(skip)]
    bound: Option<Bound>,
}

impl Sensor {
    /// Create an unparsed sensor without going through a decoder.
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            namespace: String::new(),
            subsystem: String::new(),
            name: name.into(),
            help: String::new(),
            kind: kind.into(),
            poll: DEFAULT_POLL.as_secs_f64(),
            check: Vec::new(),
            timeout: None,
            buckets: None,
            quantiles: None,
            mode: GaugeMode::default(),
            bound: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.subsystem = subsystem.into();
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll.as_secs_f64();
        self
    }

    pub fn with_check<I, S>(mut self, check: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check = check.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = Some(buckets);
        self
    }

    pub fn with_quantiles(mut self, quantiles: Vec<f64>) -> Self {
        self.quantiles = Some(quantiles);
        self
    }

    pub fn with_mode(mut self, mode: GaugeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Validate the definition and bind a freshly built collector.
    ///
    /// Steps run in order and stop at the first failure: name, type,
    /// collector construction, check, poll, timeout. `poll` must convert to an
    /// interval between [`MIN_POLL`] and [`MAX_POLL`]. On failure the sensor is
    /// left unparsed, even if an earlier call had succeeded. Calling this again
    /// after success rebuilds an equivalent, unregistered collector.
    ///
    /// # Errors
    /// Returns the [`SensorError`] of the first failing step.
    pub fn parse(&mut self) -> Result<(), SensorError> {
        match self.build() {
            Ok(bound) => {
                self.bound = Some(bound);
                Ok(())
            }
            Err(e) => {
                self.bound = None;
                Err(e)
            }
        }
    }

    fn build(&self) -> Result<Bound, SensorError> {
        let identity = self.identity();
        identity.validate()?;

        let kind = MetricKind::from_literal(&self.kind)?;
        let collector = build_collector(kind, &identity, &self.help, &self.collector_options())?;

        self.validate_check()?;
        let (interval, timeout) = self.validate_timing()?;
        Ok(Bound {
            collector,
            interval,
            timeout,
        })
    }

    fn validate_check(&self) -> Result<(), SensorError> {
        let reason = match self.check.first() {
            None => "must name an executable",
            Some(path) if path.trim().is_empty() => "executable path is blank",
            Some(_) => return Ok(()),
        };
        Err(SensorError::InvalidCheck {
            value: self.check.clone(),
            reason: reason.to_string(),
        })
    }

    /// Resolve the poll interval and the check timeout.
    fn validate_timing(&self) -> Result<(Duration, Duration), SensorError> {
        // Rejects NaN, negatives and values past `Duration::MAX`.
        let interval = Duration::try_from_secs_f64(self.poll)
            .ok()
            .filter(|d| (MIN_POLL..=MAX_POLL).contains(d))
            .ok_or(SensorError::InvalidPoll { value: self.poll })?;

        match self.timeout {
            Some(t) if t.is_zero() => Err(SensorError::InvalidOption {
                field: "timeout",
                reason: "must be greater than zero".to_string(),
            }),
            Some(t) => Ok((interval, t)),
            None => Ok((interval, interval)),
        }
    }

    fn collector_options(&self) -> CollectorOptions {
        CollectorOptions {
            buckets: self.buckets.clone(),
            quantiles: self.quantiles.clone(),
        }
    }

    /// The three name parts.
    pub fn identity(&self) -> MetricIdentity {
        MetricIdentity::new(&self.namespace, &self.subsystem, &self.name)
    }

    /// Fully-qualified metric name.
    pub fn fq_name(&self) -> String {
        self.identity().fq_name()
    }

    /// Whether a collector is bound.
    pub fn is_ready(&self) -> bool {
        self.bound.is_some()
    }

    /// The bound collector, once parsed.
    pub fn collector(&self) -> Option<&SensorCollector> {
        self.bound.as_ref().map(|b| &b.collector)
    }

    /// Resolved kind, once parsed.
    pub fn metric_kind(&self) -> Option<MetricKind> {
        self.collector().map(SensorCollector::kind)
    }

    /// Interval between checks, as validated by the last successful parse.
    pub fn poll_interval(&self) -> Option<Duration> {
        self.bound.as_ref().map(|b| b.interval)
    }

    /// Timeout applied to each check run (default: the poll interval), once parsed.
    pub fn check_timeout(&self) -> Option<Duration> {
        self.bound.as_ref().map(|b| b.timeout)
    }
}
