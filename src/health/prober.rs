//! Datasource health prober
//!
//! Probes every registered datasource through its pool's `ping` and keeps a
//! copy-on-write map of results. The same probe logic backs the synchronous
//! `check_health_and_wait` round and the periodic background task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures::future::join_all;
use parking_lot::Mutex;
use rand::Rng as _;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HealthCheckConfig;
use crate::metrics::metrics;
use crate::registry::{Descriptor, Registry};

use super::state::{HealthState, HealthStatus};

/// Periodic and on-demand liveness checks for registered datasources
pub struct HealthProber {
    registry: Arc<Registry>,
    /// Datasource name -> health state
    states: ArcSwap<HashMap<String, HealthState>>,
    /// Serializes writers; readers never take it
    write_lock: Mutex<()>,
    config: HealthCheckConfig,
}

impl HealthProber {
    pub fn new(registry: Arc<Registry>, config: HealthCheckConfig) -> Self {
        Self {
            registry,
            states: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Probe a single datasource and record the result.
    ///
    /// Returns whether the datasource is healthy afterwards.
    pub async fn probe_once(&self, descriptor: &Descriptor) -> bool {
        let result = self.probe(descriptor).await;
        let _guard = self.write_lock.lock();
        let mut next = (**self.states.load()).clone();
        let healthy = self.record(&mut next, descriptor.name(), result);
        self.states.store(Arc::new(next));
        healthy
    }

    /// Probe every registered datasource and return once all results are
    /// recorded. Individual probe failures only change recorded status.
    pub async fn check_health_and_wait(&self) {
        let descriptors = self.registry.list_all();
        let results = join_all(descriptors.iter().map(|d| async move {
            (d.name().to_string(), self.probe(d).await)
        }))
        .await;

        let _guard = self.write_lock.lock();
        let mut next = (**self.states.load()).clone();
        for (name, result) in results {
            self.record(&mut next, &name, result);
        }
        next.retain(|name, _| self.registry.contains(name));
        self.states.store(Arc::new(next));
        self.publish_gauges();

        debug!(datasources = descriptors.len(), "Health check round completed");
    }

    /// Spawn the background prober. Runs until `shutdown` is cancelled.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if !self.config.enabled {
                info!("Health checks are disabled");
                shutdown.cancelled().await;
                return;
            }

            let interval = Duration::from_millis(self.config.check_interval_ms.max(1));
            info!(
                interval_ms = self.config.check_interval_ms,
                timeout_ms = self.config.check_timeout_ms,
                failure_threshold = self.config.failure_threshold,
                "Health prober started"
            );

            // Random initial delay to stagger rounds across processes
            let initial_delay =
                rand::thread_rng().gen_range(0..interval.as_millis().max(1) as u64);
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Health prober shutting down");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_millis(initial_delay)) => {}
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Health prober shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.check_health_and_wait().await;
                    }
                }
            }
        })
    }

    /// Read-only health snapshot: one entry per registered datasource
    pub fn get_health_status(&self) -> HashMap<String, bool> {
        let states = self.states.load();
        self.registry
            .snapshot()
            .iter()
            .map(|d| {
                let healthy = states.get(d.name()).map(|s| s.is_healthy()).unwrap_or(false);
                (d.name().to_string(), healthy)
            })
            .collect()
    }

    pub fn is_healthy(&self, name: &str) -> bool {
        self.states
            .load()
            .get(name)
            .map(|s| s.is_healthy())
            .unwrap_or(false)
    }

    /// Current state map, for callers filtering many names at once
    pub fn states(&self) -> Arc<HashMap<String, HealthState>> {
        self.states.load_full()
    }

    /// Full state for a datasource, if it has been probed
    pub fn state(&self, name: &str) -> Option<HealthState> {
        self.states.load().get(name).cloned()
    }

    /// Drop the recorded state of an unregistered datasource
    pub fn forget(&self, name: &str) {
        let _guard = self.write_lock.lock();
        let current = self.states.load();
        if !current.contains_key(name) {
            return;
        }
        let mut next = (**current).clone();
        next.remove(name);
        self.states.store(Arc::new(next));
        self.publish_gauges();
        debug!(datasource = %name, "Dropped health state");
    }

    /// Status counts over registered datasources
    pub fn stats(&self) -> HealthStats {
        let states = self.states.load();
        let mut stats = HealthStats::default();
        for d in self.registry.snapshot().iter() {
            stats.total += 1;
            match states.get(d.name()).map(|s| s.status).unwrap_or_default() {
                HealthStatus::Healthy => stats.healthy += 1,
                HealthStatus::Unhealthy => stats.unhealthy += 1,
                HealthStatus::Unknown => stats.unknown += 1,
            }
        }
        stats
    }

    async fn probe(&self, descriptor: &Descriptor) -> Result<(), String> {
        let timeout = Duration::from_millis(self.config.check_timeout_ms);
        match tokio::time::timeout(timeout, descriptor.pool().ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "probe timed out after {}ms",
                self.config.check_timeout_ms
            )),
        }
    }

    /// Apply one probe result to `states`; returns the resulting health.
    /// Results for datasources that were unregistered meanwhile are dropped.
    fn record(
        &self,
        states: &mut HashMap<String, HealthState>,
        name: &str,
        result: Result<(), String>,
    ) -> bool {
        if !self.registry.contains(name) {
            debug!(datasource = %name, "Discarding probe result for unregistered datasource");
            states.remove(name);
            return false;
        }

        let state = states
            .entry(name.to_string())
            .or_insert_with(|| HealthState::new(self.config.failure_threshold));

        match result {
            Ok(()) => {
                metrics().record_health_check(name, true);
                if state.record_success() {
                    info!(datasource = %name, status = state.status.as_str(), "Datasource status changed");
                } else {
                    debug!(datasource = %name, "Health check passed");
                }
            }
            Err(e) => {
                metrics().record_health_check(name, false);
                if state.record_failure(e.clone()) {
                    warn!(
                        datasource = %name,
                        error = %e,
                        failures = state.consecutive_failures,
                        status = state.status.as_str(),
                        "Datasource status changed"
                    );
                } else {
                    debug!(datasource = %name, error = %e, "Health check failed");
                }
            }
        }
        state.is_healthy()
    }

    fn publish_gauges(&self) {
        let stats = self.stats();
        metrics().set_datasource_counts(stats.healthy, stats.unhealthy, stats.unknown);
    }
}

/// Status counts across registered datasources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthStats {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub unknown: usize,
}
