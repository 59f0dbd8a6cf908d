//! Typed collector construction.
//!
//! Every kind gets its own handle type exposing only the updates that make
//! sense for it. [`SensorCollector`] is the closed set of those handles.
//! Collectors are built unregistered; [`SensorCollector::register`] binds one
//! to an explicit [`Registry`].

use std::fmt;

use prometheus::core::Collector;
use prometheus::{Counter, Gauge, Histogram, HistogramOpts, Opts, Registry};

use super::kind::MetricKind;
use super::naming::MetricIdentity;
use super::summary::{DEFAULT_QUANTILES, Summary};
use super::{SensorError, UpdateError};

/// Kind-specific construction parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectorOptions {
    /// Histogram bucket upper bounds (default: [`prometheus::DEFAULT_BUCKETS`]).
    pub buckets: Option<Vec<f64>>,
    /// Summary quantile objectives (default: [`DEFAULT_QUANTILES`]).
    pub quantiles: Option<Vec<f64>>,
}

/// Counter capability: non-negative increments only.
#[derive(Clone)]
pub struct CounterHandle {
    counter: Counter,
}

impl CounterHandle {
    /// Add a non-negative, finite delta.
    ///
    /// # Errors
    /// Rejects negative or non-finite deltas without touching the counter.
    pub fn add(&self, delta: f64) -> Result<(), UpdateError> {
        if !delta.is_finite() {
            return Err(UpdateError::NonFinite(delta));
        }
        if delta < 0.0 {
            return Err(UpdateError::NegativeDelta(delta));
        }
        self.counter.inc_by(delta);
        Ok(())
    }

    /// Current accumulated value.
    pub fn get(&self) -> f64 {
        self.counter.get()
    }
}

/// Gauge capability: absolute set and signed add.
#[derive(Clone)]
pub struct GaugeHandle {
    gauge: Gauge,
}

impl GaugeHandle {
    /// Replace the current value.
    pub fn set(&self, value: f64) -> Result<(), UpdateError> {
        ensure_finite(value)?;
        self.gauge.set(value);
        Ok(())
    }

    /// Add a signed delta.
    pub fn add(&self, delta: f64) -> Result<(), UpdateError> {
        ensure_finite(delta)?;
        self.gauge.add(delta);
        Ok(())
    }

    /// Current value.
    pub fn get(&self) -> f64 {
        self.gauge.get()
    }
}

/// Histogram capability: observations bucketed by upper bound.
#[derive(Clone)]
pub struct HistogramHandle {
    histogram: Histogram,
    buckets: Vec<f64>,
}

impl HistogramHandle {
    /// Record one observation.
    pub fn observe(&self, value: f64) -> Result<(), UpdateError> {
        ensure_finite(value)?;
        self.histogram.observe(value);
        Ok(())
    }

    /// Number of observations so far.
    pub fn sample_count(&self) -> u64 {
        self.histogram.get_sample_count()
    }

    /// Sum of observations so far.
    pub fn sample_sum(&self) -> f64 {
        self.histogram.get_sample_sum()
    }

    /// Bucket upper bounds in effect.
    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }
}

/// Summary capability: observations tracked against quantile objectives.
#[derive(Clone)]
pub struct SummaryHandle {
    summary: Summary,
}

impl SummaryHandle {
    /// Record one observation.
    pub fn observe(&self, value: f64) -> Result<(), UpdateError> {
        ensure_finite(value)?;
        self.summary.observe(value);
        Ok(())
    }

    /// Number of observations so far.
    pub fn sample_count(&self) -> u64 {
        self.summary.sample_count()
    }

    /// Sum of observations so far.
    pub fn sample_sum(&self) -> f64 {
        self.summary.sample_sum()
    }

    /// Quantile objectives in effect.
    pub fn quantiles(&self) -> &[f64] {
        self.summary.quantiles()
    }

    /// Current `(quantile, value)` pairs.
    pub fn quantile_values(&self) -> Vec<(f64, f64)> {
        self.summary.quantile_values()
    }
}

fn ensure_finite(value: f64) -> Result<(), UpdateError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(UpdateError::NonFinite(value))
    }
}

/// A bound collector, one variant per metric kind.
#[derive(Clone)]
pub enum SensorCollector {
    Counter(CounterHandle),
    Gauge(GaugeHandle),
    Histogram(HistogramHandle),
    Summary(SummaryHandle),
}

impl SensorCollector {
    /// The kind this collector was built for.
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Histogram(_) => MetricKind::Histogram,
            Self::Summary(_) => MetricKind::Summary,
        }
    }

    /// Fully-qualified metric name.
    pub fn fq_name(&self) -> &str {
        let desc = match self {
            Self::Counter(h) => h.counter.desc(),
            Self::Gauge(h) => h.gauge.desc(),
            Self::Histogram(h) => h.histogram.desc(),
            Self::Summary(h) => h.summary.desc(),
        };
        desc.into_iter()
            .next()
            .map(|d| d.fq_name.as_str())
            .unwrap_or_default()
    }

    pub fn as_counter(&self) -> Option<&CounterHandle> {
        match self {
            Self::Counter(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_gauge(&self) -> Option<&GaugeHandle> {
        match self {
            Self::Gauge(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&HistogramHandle> {
        match self {
            Self::Histogram(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_summary(&self) -> Option<&SummaryHandle> {
        match self {
            Self::Summary(h) => Some(h),
            _ => None,
        }
    }

    /// Register with `registry`.
    ///
    /// # Errors
    /// Fails with `AlreadyReg` if a collector with the same name is registered.
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(self.boxed())
    }

    /// Remove from `registry`.
    pub fn unregister(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.unregister(self.boxed())
    }

    fn boxed(&self) -> Box<dyn Collector> {
        match self {
            Self::Counter(h) => Box::new(h.counter.clone()),
            Self::Gauge(h) => Box::new(h.gauge.clone()),
            Self::Histogram(h) => Box::new(h.histogram.clone()),
            Self::Summary(h) => Box::new(h.summary.clone()),
        }
    }
}

impl fmt::Debug for SensorCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorCollector")
            .field("kind", &self.kind())
            .field("name", &self.fq_name())
            .finish()
    }
}

/// Build a collector from a raw kind literal.
///
/// # Errors
/// Returns [`SensorError::InvalidKind`] for anything but the four kinds, and
/// [`SensorError::InvalidOption`] for malformed buckets or quantiles.
pub fn create_collector(
    kind: &str,
    identity: &MetricIdentity,
    help: &str,
    options: &CollectorOptions,
) -> Result<SensorCollector, SensorError> {
    let kind = MetricKind::from_literal(kind)?;
    build_collector(kind, identity, help, options)
}

/// Build a collector for an already-resolved kind.
pub fn build_collector(
    kind: MetricKind,
    identity: &MetricIdentity,
    help: &str,
    options: &CollectorOptions,
) -> Result<SensorCollector, SensorError> {
    // The metrics library rejects empty help strings.
    let help = if help.trim().is_empty() {
        identity.fq_name()
    } else {
        help.to_string()
    };

    let collector = match kind {
        MetricKind::Counter => {
            let counter = Counter::with_opts(opts(identity, help))?;
            SensorCollector::Counter(CounterHandle { counter })
        }
        MetricKind::Gauge => {
            let gauge = Gauge::with_opts(opts(identity, help))?;
            SensorCollector::Gauge(GaugeHandle { gauge })
        }
        MetricKind::Histogram => {
            let buckets = match &options.buckets {
                Some(buckets) => validate_buckets(buckets)?,
                None => prometheus::DEFAULT_BUCKETS.to_vec(),
            };
            let histogram_opts = HistogramOpts::new(identity.name.clone(), help)
                .namespace(identity.namespace.clone())
                .subsystem(identity.subsystem.clone())
                .buckets(buckets.clone());
            let histogram = Histogram::with_opts(histogram_opts)?;
            SensorCollector::Histogram(HistogramHandle { histogram, buckets })
        }
        MetricKind::Summary => {
            let quantiles = match &options.quantiles {
                Some(quantiles) => validate_quantiles(quantiles)?,
                None => DEFAULT_QUANTILES.to_vec(),
            };
            let summary = Summary::new(identity.fq_name(), help, &quantiles)?;
            SensorCollector::Summary(SummaryHandle { summary })
        }
    };

    tracing::debug!(metric = %identity, kind = %kind, "Collector built");
    Ok(collector)
}

fn opts(identity: &MetricIdentity, help: String) -> Opts {
    Opts::new(identity.name.clone(), help)
        .namespace(identity.namespace.clone())
        .subsystem(identity.subsystem.clone())
}

fn validate_buckets(buckets: &[f64]) -> Result<Vec<f64>, SensorError> {
    let invalid = |reason: String| SensorError::InvalidOption {
        field: "buckets",
        reason,
    };

    if buckets.is_empty() {
        return Err(invalid("must contain at least one bound".to_string()));
    }
    if let Some(b) = buckets.iter().find(|b| !b.is_finite()) {
        return Err(invalid(format!("bound {b} is not finite")));
    }
    if let Some(pair) = buckets.windows(2).find(|w| w[0] >= w[1]) {
        return Err(invalid(format!(
            "bounds must be strictly increasing, got {} then {}",
            pair[0], pair[1]
        )));
    }
    Ok(buckets.to_vec())
}

fn validate_quantiles(quantiles: &[f64]) -> Result<Vec<f64>, SensorError> {
    if quantiles.is_empty() {
        return Err(SensorError::InvalidOption {
            field: "quantiles",
            reason: "must contain at least one objective".to_string(),
        });
    }
    if let Some(q) = quantiles.iter().find(|q| !(0.0..=1.0).contains(*q)) {
        return Err(SensorError::InvalidOption {
            field: "quantiles",
            reason: format!("objective {q} is outside [0, 1]"),
        });
    }
    Ok(quantiles.to_vec())
}
