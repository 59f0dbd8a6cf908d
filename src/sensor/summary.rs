//! Sliding-window quantile summary.
//!
//! The `prometheus` crate has no summary type, so this one implements
//! [`prometheus::core::Collector`] directly. Quantiles are computed with the
//! nearest-rank method over observations younger than `max_age`, capped at
//! `max_samples`. Count and sum cover every observation ever made.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use prometheus::core::{Collector, Desc};
use prometheus::proto::{Metric, MetricFamily, MetricType, Quantile, Summary as SummaryProto};

/// Default quantile objectives.
pub const DEFAULT_QUANTILES: &[f64] = &[0.5, 0.9, 0.99];

/// Default observation window (10 minutes).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(600);

/// Default cap on retained observations.
pub const DEFAULT_MAX_SAMPLES: usize = 10_000;

#[derive(Debug, Default)]
struct WindowState {
    samples: VecDeque<(Instant, f64)>,
    count: u64,
    sum: f64,
}

struct SummaryCore {
    desc: Desc,
    quantiles: Vec<f64>,
    max_age: Duration,
    max_samples: usize,
    state: Mutex<WindowState>,
}

/// A quantile summary safe to share between a poller and the exposition layer.
#[derive(Clone)]
pub struct Summary {
    core: Arc<SummaryCore>,
}

impl Summary {
    /// Create a summary with the default window.
    ///
    /// Quantiles are sorted and de-duplicated; range checks belong to the caller.
    ///
    /// # Errors
    /// Returns the metrics library error if the name or help are rejected.
    pub fn new(
        fq_name: impl Into<String>,
        help: impl Into<String>,
        quantiles: &[f64],
    ) -> prometheus::Result<Self> {
        Self::with_window(fq_name, help, quantiles, DEFAULT_MAX_AGE, DEFAULT_MAX_SAMPLES)
    }

    /// Create a summary with an explicit window.
    pub fn with_window(
        fq_name: impl Into<String>,
        help: impl Into<String>,
        quantiles: &[f64],
        max_age: Duration,
        max_samples: usize,
    ) -> prometheus::Result<Self> {
        let desc = Desc::new(fq_name.into(), help.into(), Vec::new(), HashMap::new())?;

        let mut quantiles = quantiles.to_vec();
        quantiles.sort_by(f64::total_cmp);
        quantiles.dedup();

        Ok(Self {
            core: Arc::new(SummaryCore {
                desc,
                quantiles,
                max_age,
                max_samples: max_samples.max(1),
                state: Mutex::new(WindowState::default()),
            }),
        })
    }

    /// Record one observation.
    pub fn observe(&self, value: f64) {
        let now = Instant::now();
        let mut state = self.lock();
        state.count += 1;
        state.sum += value;
        state.samples.push_back((now, value));
        self.evict(&mut state, now);
    }

    /// Total number of observations.
    pub fn sample_count(&self) -> u64 {
        self.lock().count
    }

    /// Sum of all observations.
    pub fn sample_sum(&self) -> f64 {
        self.lock().sum
    }

    /// Configured quantile objectives.
    pub fn quantiles(&self) -> &[f64] {
        &self.core.quantiles
    }

    /// Current `(quantile, value)` pairs over the live window.
    ///
    /// Values are `NaN` while the window is empty.
    pub fn quantile_values(&self) -> Vec<(f64, f64)> {
        let mut state = self.lock();
        self.evict(&mut state, Instant::now());

        let mut window: Vec<f64> = state.samples.iter().map(|(_, v)| *v).collect();
        drop(state);
        window.sort_by(f64::total_cmp);

        self.core
            .quantiles
            .iter()
            .map(|&q| (q, nearest_rank(&window, q)))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        // Observations are plain arithmetic; a poisoned lock still holds usable state.
        self.core
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn evict(&self, state: &mut WindowState, now: Instant) {
        while let Some(&(ts, _)) = state.samples.front() {
            if now.duration_since(ts) > self.core.max_age
                || state.samples.len() > self.core.max_samples
            {
                state.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

fn nearest_rank(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

impl Collector for Summary {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.core.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let quantiles: Vec<Quantile> = self
            .quantile_values()
            .into_iter()
            .map(|(q, v)| {
                let mut quantile = Quantile::default();
                quantile.set_quantile(q);
                quantile.set_value(v);
                quantile
            })
            .collect();

        let mut summary = SummaryProto::default();
        {
            let state = self.lock();
            summary.set_sample_count(state.count);
            summary.set_sample_sum(state.sum);
        }
        summary.set_quantile(quantiles.into());

        let mut metric = Metric::default();
        metric.set_summary(summary);

        let mut family = MetricFamily::default();
        family.set_name(self.core.desc.fq_name.clone());
        family.set_help(self.core.desc.help.clone());
        family.set_field_type(MetricType::SUMMARY);
        family.set_metric(vec![metric].into());
        vec![family]
    }
}

impl fmt::Debug for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Summary")
            .field("name", &self.core.desc.fq_name)
            .field("quantiles", &self.core.quantiles)
            .field("max_age", &self.core.max_age)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary_reports_nan() {
        let summary = Summary::new("empty_summary", "help", DEFAULT_QUANTILES).unwrap();
        assert_eq!(summary.sample_count(), 0);
        let values = summary.quantile_values();
        assert_eq!(values.len(), 3);
        assert!(values.iter().all(|(_, v)| v.is_nan()));
    }

    #[test]
    fn test_quantiles_nearest_rank() {
        let summary = Summary::new("latency", "help", DEFAULT_QUANTILES).unwrap();
        for v in 1..=100 {
            summary.observe(v as f64);
        }
        assert_eq!(summary.sample_count(), 100);
        assert_eq!(summary.sample_sum(), 5050.0);
        assert_eq!(summary.quantile_values(), vec![(0.5, 50.0), (0.9, 90.0), (0.99, 99.0)]);
    }

    #[test]
    fn test_quantiles_sorted_and_deduplicated() {
        let summary = Summary::new("s", "help", &[0.9, 0.5, 0.9]).unwrap();
        assert_eq!(summary.quantiles(), &[0.5, 0.9]);
    }

    #[test]
    fn test_window_cap_keeps_newest() {
        let summary =
            Summary::with_window("capped", "help", &[0.0, 1.0], DEFAULT_MAX_AGE, 3).unwrap();
        for v in [100.0, 1.0, 2.0, 3.0] {
            summary.observe(v);
        }
        // Count and sum are cumulative even though the window dropped 100.
        assert_eq!(summary.sample_count(), 4);
        assert_eq!(summary.sample_sum(), 106.0);
        assert_eq!(summary.quantile_values(), vec![(0.0, 1.0), (1.0, 3.0)]);
    }

    #[test]
    fn test_collect_metric_family() {
        let summary = Summary::new("ns_sub_duration", "check duration", &[0.5]).unwrap();
        summary.observe(2.0);
        summary.observe(4.0);

        let families = summary.collect();
        assert_eq!(families.len(), 1);
        let family = &families[0];
        assert_eq!(family.get_name(), "ns_sub_duration");
        assert_eq!(family.get_help(), "check duration");
        assert_eq!(family.get_field_type(), MetricType::SUMMARY);

        let proto = family.get_metric()[0].get_summary();
        assert_eq!(proto.get_sample_count(), 2);
        assert_eq!(proto.get_sample_sum(), 6.0);
        assert_eq!(proto.get_quantile()[0].get_quantile(), 0.5);
        assert_eq!(proto.get_quantile()[0].get_value(), 2.0);
    }

    #[test]
    fn test_invalid_name_rejected_by_library() {
        assert!(Summary::new("bad.name", "help", DEFAULT_QUANTILES).is_err());
    }
}
