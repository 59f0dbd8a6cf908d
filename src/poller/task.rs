//! The per-sensor poll loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::check::{CheckRunner, parse_reading};
use super::{FirstTick, PollError, PollerState, RegistryError};
use crate::sensor::{GaugeMode, MetricKind, Sensor, SensorCollector, UpdateError};

/// Snapshot of one sensor's most recent polling outcome.
#[derive(Debug, Clone, Serialize)]
pub struct SensorStatus {
    /// Fully-qualified metric name.
    pub name: String,
    pub kind: MetricKind,
    /// Poll interval in seconds.
    pub poll_secs: f64,
    pub state: PollerState,
    /// Last reading applied to the collector.
    pub last_value: Option<f64>,
    pub last_success: Option<DateTime<Utc>>,
    /// Error of the most recent failed tick, cleared on success.
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub total_polls: u64,
}

/// Apply a reading with the update that matches the collector's kind.
///
/// Counters add, gauges set (or add under [`GaugeMode::Add`]), histograms and
/// summaries observe.
pub fn apply_reading(
    collector: &SensorCollector,
    mode: GaugeMode,
    value: f64,
) -> Result<(), UpdateError> {
    match collector {
        SensorCollector::Counter(counter) => counter.add(value),
        SensorCollector::Gauge(gauge) => match mode {
            GaugeMode::Set => gauge.set(value),
            GaugeMode::Add => gauge.add(value),
        },
        SensorCollector::Histogram(histogram) => histogram.observe(value),
        SensorCollector::Summary(summary) => summary.observe(value),
    }
}

/// Polls one sensor on its interval until told to stop.
pub struct SensorPoller {
    name: String,
    collector: SensorCollector,
    mode: GaugeMode,
    check: Vec<String>,
    interval: Duration,
    timeout: Duration,
    first_tick: FirstTick,
    runner: Arc<dyn CheckRunner>,
    status: watch::Sender<SensorStatus>,
}

impl SensorPoller {
    /// Build a poller for a parsed sensor.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotReady`] if the sensor has no collector.
    pub fn new(sensor: &Sensor, runner: Arc<dyn CheckRunner>) -> Result<Self, RegistryError> {
        let name = sensor.fq_name();
        let not_ready = || RegistryError::NotReady(name.clone());
        let collector = sensor.collector().cloned().ok_or_else(not_ready)?;
        let interval = sensor.poll_interval().ok_or_else(not_ready)?;
        let timeout = sensor.check_timeout().ok_or_else(not_ready)?;

        let (status, _) = watch::channel(SensorStatus {
            name: name.clone(),
            kind: collector.kind(),
            poll_secs: interval.as_secs_f64(),
            state: PollerState::Idle,
            last_value: None,
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
            total_polls: 0,
        });

        Ok(Self {
            name,
            collector,
            mode: sensor.mode,
            check: sensor.check.clone(),
            interval,
            timeout,
            first_tick: FirstTick::default(),
            runner,
            status,
        })
    }

    /// Choose when the first check runs.
    pub fn with_first_tick(mut self, first_tick: FirstTick) -> Self {
        self.first_tick = first_tick;
        self
    }

    /// Interval between checks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Watch this poller's status.
    pub fn subscribe(&self) -> watch::Receiver<SensorStatus> {
        self.status.subscribe()
    }

    /// Run the check once and apply its reading.
    ///
    /// The collector is only touched if the command succeeds and its output
    /// parses.
    pub async fn poll_once(&self) -> Result<f64, PollError> {
        self.set_state(PollerState::Running);
        let output = self.runner.run(&self.check, self.timeout).await?;
        let value = parse_reading(&output)?;

        self.set_state(PollerState::Updating);
        apply_reading(&self.collector, self.mode, value)?;
        Ok(value)
    }

    /// One tick: poll, record the outcome, return to idle.
    pub async fn tick(&self) {
        let result = self.poll_once().await;

        match &result {
            Ok(value) => {
                tracing::debug!(sensor = %self.name, value, "Sensor updated");
            }
            Err(e) => {
                tracing::warn!(sensor = %self.name, error = %e, "Sensor poll failed");
            }
        }

        self.status.send_modify(|status| {
            status.state = PollerState::Idle;
            status.total_polls += 1;
            match result {
                Ok(value) => {
                    status.last_value = Some(value);
                    status.last_success = Some(Utc::now());
                    status.last_error = None;
                    status.consecutive_failures = 0;
                }
                Err(e) => {
                    status.last_error = Some(e.to_string());
                    status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                }
            }
        });
    }

    /// Poll on the interval until `shutdown` turns true or its sender is dropped.
    ///
    /// Ticks that come due while a check is still running are skipped, so at
    /// most one check per sensor is ever in flight. Shutdown is observed
    /// between ticks.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let start = match self.first_tick {
            FirstTick::Immediate => Instant::now(),
            FirstTick::AfterInterval => Instant::now() + self.interval,
        };
        let mut ticker = interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            sensor = %self.name,
            interval = ?self.interval,
            timeout = ?self.timeout,
            "Poller started"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        self.set_state(PollerState::Stopped);
        tracing::info!(sensor = %self.name, "Poller stopped");
    }

    fn set_state(&self, state: PollerState) {
        self.status.send_modify(|status| status.state = state);
    }
}

impl std::fmt::Debug for SensorPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorPoller")
            .field("name", &self.name)
            .field("kind", &self.collector.kind())
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays canned check results, then repeats the last one.
    struct ScriptedRunner {
        script: Mutex<VecDeque<Result<&'static str, Duration>>>,
    }

    impl ScriptedRunner {
        fn new(script: Vec<Result<&'static str, Duration>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
            })
        }
    }

    #[async_trait::async_trait]
    impl CheckRunner for ScriptedRunner {
        async fn run(&self, _command: &[String], _timeout: Duration) -> Result<String, PollError> {
            let next = {
                let mut script = self.script.lock().unwrap();
                if script.len() > 1 {
                    script.pop_front().unwrap()
                } else {
                    *script.front().unwrap()
                }
            };
            next.map(str::to_string).map_err(PollError::Timeout)
        }
    }

    fn parsed(kind: &str) -> Sensor {
        let mut sensor = Sensor::new("sensor_poll", kind)
            .with_poll(Duration::from_secs(1))
            .with_check(["/bin/sensor.sh"]);
        sensor.parse().unwrap();
        sensor
    }

    #[test]
    fn test_apply_reading_per_kind() {
        let counter = parsed("counter");
        let c = counter.collector().unwrap();
        apply_reading(c, GaugeMode::Set, 2.0).unwrap();
        apply_reading(c, GaugeMode::Set, 3.0).unwrap();
        assert_eq!(c.as_counter().unwrap().get(), 5.0);

        let gauge = parsed("gauge");
        let g = gauge.collector().unwrap();
        apply_reading(g, GaugeMode::Set, 2.0).unwrap();
        apply_reading(g, GaugeMode::Set, 7.0).unwrap();
        assert_eq!(g.as_gauge().unwrap().get(), 7.0);
        apply_reading(g, GaugeMode::Add, -2.0).unwrap();
        assert_eq!(g.as_gauge().unwrap().get(), 5.0);

        let histogram = parsed("histogram");
        let h = histogram.collector().unwrap();
        apply_reading(h, GaugeMode::Set, 0.2).unwrap();
        assert_eq!(h.as_histogram().unwrap().sample_count(), 1);

        let summary = parsed("summary");
        let s = summary.collector().unwrap();
        apply_reading(s, GaugeMode::Set, 0.2).unwrap();
        assert_eq!(s.as_summary().unwrap().sample_count(), 1);
    }

    #[test]
    fn test_unparsed_sensor_rejected() {
        let sensor = Sensor::new("sensor_poll", "counter");
        let err = SensorPoller::new(&sensor, ScriptedRunner::new(vec![Ok("1")])).unwrap_err();
        assert!(matches!(err, RegistryError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_bad_readings_leave_collector_untouched() {
        let sensor = parsed("counter");
        let runner = ScriptedRunner::new(vec![
            Err(Duration::from_secs(1)),
            Ok("not-a-number"),
            Ok("-4"),
            Ok("3"),
        ]);
        let poller = SensorPoller::new(&sensor, runner).unwrap();
        let counter = sensor.collector().unwrap().as_counter().unwrap();

        assert!(poller.poll_once().await.unwrap_err().is_execution());
        assert!(poller.poll_once().await.unwrap_err().is_parse());
        assert!(matches!(
            poller.poll_once().await,
            Err(PollError::Rejected(UpdateError::NegativeDelta(_)))
        ));
        assert_eq!(counter.get(), 0.0);

        assert_eq!(poller.poll_once().await.unwrap(), 3.0);
        assert_eq!(counter.get(), 3.0);
    }

    #[tokio::test]
    async fn test_tick_records_status() {
        let sensor = parsed("gauge");
        let runner = ScriptedRunner::new(vec![Ok("garbage"), Ok("garbage"), Ok("12.5")]);
        let poller = SensorPoller::new(&sensor, runner).unwrap();
        let status = poller.subscribe();

        poller.tick().await;
        poller.tick().await;
        {
            let s = status.borrow();
            assert_eq!(s.state, PollerState::Idle);
            assert_eq!(s.consecutive_failures, 2);
            assert!(s.last_error.as_deref().unwrap().contains("garbage"));
            assert!(s.last_value.is_none());
        }

        poller.tick().await;
        let s = status.borrow();
        assert_eq!(s.last_value, Some(12.5));
        assert!(s.last_success.is_some());
        assert!(s.last_error.is_none());
        assert_eq!(s.consecutive_failures, 0);
        assert_eq!(s.total_polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_failures_and_stops() {
        let sensor = parsed("counter");
        let runner = ScriptedRunner::new(vec![Ok("oops"), Err(Duration::from_secs(1)), Ok("2")]);
        let poller = SensorPoller::new(&sensor, runner)
            .unwrap()
            .with_first_tick(FirstTick::Immediate);
        let status = poller.subscribe();
        let counter = sensor.collector().unwrap().as_counter().unwrap().clone();

        let (stop, shutdown) = watch::channel(false);
        let handle = tokio::spawn(poller.run(shutdown));

        // Ticks at t=0 (bad output), t=1 (timeout), t=2, t=3 (reading 2 each).
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(counter.get(), 4.0);
        assert_eq!(status.borrow().total_polls, 4);

        stop.send_replace(true);
        handle.await.unwrap();
        assert_eq!(status.borrow().state, PollerState::Stopped);
    }

    /// Takes `first` to answer the first call, then answers instantly.
    /// Tracks how many calls overlap.
    struct SlowStartRunner {
        first: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CheckRunner for SlowStartRunner {
        async fn run(&self, _command: &[String], _timeout: Duration) -> Result<String, PollError> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(self.first).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("1".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overdue_ticks_are_skipped() {
        let sensor = parsed("counter");
        let runner = Arc::new(SlowStartRunner {
            first: Duration::from_millis(2500),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let poller = SensorPoller::new(&sensor, runner.clone())
            .unwrap()
            .with_first_tick(FirstTick::Immediate);
        let status = poller.subscribe();

        let (stop, shutdown) = watch::channel(false);
        let handle = tokio::spawn(poller.run(shutdown));

        // t=0 runs until 2.5. The ticks due at 1 and 2 collapse into one at
        // 2.5, then the schedule resumes at 3, 4 and 5.
        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(status.borrow().total_polls, 5);
        assert_eq!(runner.max_in_flight.load(Ordering::SeqCst), 1);

        stop.send_replace(true);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_interval() {
        let sensor = parsed("counter");
        let runner = ScriptedRunner::new(vec![Ok("1")]);
        let poller = SensorPoller::new(&sensor, runner)
            .unwrap()
            .with_first_tick(FirstTick::AfterInterval);
        let counter = sensor.collector().unwrap().as_counter().unwrap().clone();

        let (stop, shutdown) = watch::channel(false);
        let handle = tokio::spawn(poller.run(shutdown));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(counter.get(), 0.0);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(counter.get(), 1.0);

        drop(stop);
        handle.await.unwrap();
    }
}
