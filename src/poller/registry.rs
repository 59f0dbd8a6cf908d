//! Sensor registry for managing poller lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

use super::check::{CheckRunner, CommandRunner};
use super::task::{SensorPoller, SensorStatus};
use super::{FirstTick, RegistryError};
use crate::sensor::{MetricKind, Sensor, SensorCollector};

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Metadata about a running sensor.
#[derive(Debug, Clone, Serialize)]
pub struct SensorInfo {
    /// Fully-qualified metric name.
    pub name: String,
    pub kind: MetricKind,
    /// Interval between checks.
    #[serde(with = "humantime_serde")]
    pub poll: Duration,
}

struct SensorEntry {
    info: SensorInfo,
    collector: SensorCollector,
    status: watch::Receiver<SensorStatus>,
    handle: Option<JoinHandle<()>>,
}

/// Registry of running sensors.
///
/// Owns an explicit metrics [`Registry`]: spawning a sensor registers its
/// collector there and starts its poller on a dedicated Tokio task.
pub struct SensorRegistry {
    metrics: Registry,
    runner: Arc<dyn CheckRunner>,
    first_tick: FirstTick,
    shutdown: watch::Sender<bool>,
    sensors: RwLock<HashMap<String, SensorEntry>>,
}

impl SensorRegistry {
    /// Create a registry that runs checks as child processes.
    pub fn new(metrics: Registry) -> Self {
        Self::with_runner(metrics, Arc::new(CommandRunner))
    }

    /// Create a registry with a custom check runner.
    pub fn with_runner(metrics: Registry, runner: Arc<dyn CheckRunner>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            metrics,
            runner,
            first_tick: FirstTick::default(),
            shutdown,
            sensors: RwLock::new(HashMap::new()),
        }
    }

    /// Choose when newly spawned pollers run their first check.
    pub fn with_first_tick(mut self, first_tick: FirstTick) -> Self {
        self.first_tick = first_tick;
        self
    }

    /// The metrics registry collectors are registered with.
    pub fn metrics(&self) -> &Registry {
        &self.metrics
    }

    /// Register a parsed sensor's collector and start polling it.
    ///
    /// # Errors
    /// Fails if the sensor is unparsed, its name is already taken, or the
    /// metrics registry refuses the collector. Nothing is started on failure.
    pub async fn spawn(&self, sensor: &Sensor) -> Result<SensorInfo, RegistryError> {
        let poller = SensorPoller::new(sensor, Arc::clone(&self.runner))?
            .with_first_tick(self.first_tick);
        let name = sensor.fq_name();
        let collector = sensor
            .collector()
            .cloned()
            .ok_or_else(|| RegistryError::NotReady(name.clone()))?;

        let mut sensors = self.sensors.write().await;
        if sensors.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        collector.register(&self.metrics).inspect_err(|e| {
            tracing::error!(sensor = %name, error = %e, "Collector registration failed");
        })?;

        let info = SensorInfo {
            name: name.clone(),
            kind: collector.kind(),
            poll: poller.interval(),
        };
        let status = poller.subscribe();
        let handle = tokio::spawn(poller.run(self.shutdown.subscribe()));

        sensors.insert(
            name.clone(),
            SensorEntry {
                info: info.clone(),
                collector,
                status,
                handle: Some(handle),
            },
        );

        tracing::info!(sensor = %name, kind = %info.kind, poll = ?info.poll, "Sensor registered");
        Ok(info)
    }

    /// List all registered sensors, sorted by name.
    pub async fn list_sensors(&self) -> Vec<SensorInfo> {
        let mut infos: Vec<_> = self
            .sensors
            .read()
            .await
            .values()
            .map(|e| e.info.clone())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Latest status of every sensor, sorted by name.
    pub async fn statuses(&self) -> Vec<SensorStatus> {
        let mut statuses: Vec<_> = self
            .sensors
            .read()
            .await
            .values()
            .map(|e| e.status.borrow().clone())
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Get the number of registered sensors.
    pub async fn sensor_count(&self) -> usize {
        self.sensors.read().await.len()
    }

    /// Stop one sensor and unregister its collector.
    pub async fn remove(&self, name: &str) -> Result<(), RegistryError> {
        let entry = self
            .sensors
            .write()
            .await
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        if let Some(handle) = entry.handle {
            handle.abort();
        }
        entry.collector.unregister(&self.metrics)?;
        tracing::info!(sensor = %name, "Sensor removed");
        Ok(())
    }

    /// Stop every poller, waiting up to [`DEFAULT_SHUTDOWN_TIMEOUT`].
    pub async fn shutdown(&self) {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Stop every poller, aborting those still busy after `timeout`.
    ///
    /// Collectors stay registered so a final scrape still sees their values.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) {
        self.shutdown.send_replace(true);

        let mut handles: Vec<(String, JoinHandle<()>)> = self
            .sensors
            .write()
            .await
            .iter_mut()
            .filter_map(|(name, entry)| entry.handle.take().map(|h| (name.clone(), h)))
            .collect();
        let count = handles.len();

        let joined = tokio::time::timeout(timeout, async {
            for (name, handle) in handles.iter_mut() {
                if let Err(e) = handle.await {
                    tracing::error!(sensor = %name, error = %e, "Poller task failed");
                }
            }
        })
        .await;

        if joined.is_err() {
            let pending: Vec<&str> = handles
                .iter()
                .filter(|(_, h)| !h.is_finished())
                .map(|(name, _)| name.as_str())
                .collect();
            tracing::warn!(?pending, "Poller shutdown timed out; aborting remaining checks");
            for (_, handle) in &handles {
                handle.abort();
            }
        } else {
            tracing::info!(sensors = count, "Poller shutdown complete");
        }
    }
}

impl std::fmt::Debug for SensorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorRegistry")
            .field(
                "sensor_count",
                &self.sensors.try_read().map(|s| s.len()).unwrap_or(0),
            )
            .field("first_tick", &self.first_tick)
            .finish_non_exhaustive()
    }
}
