//! Prometheus metrics for datasource routing
//!
//! `gather()` renders the text exposition format for whatever endpoint the
//! embedding service exposes.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use std::sync::OnceLock;

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Router metrics collection
pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    // Routing metrics
    /// Calls routed, by role, datasource and whether the name was pinned
    pub routes_total: IntCounterVec,
    /// Routing failures by kind
    pub route_errors_total: IntCounterVec,
    /// Routed call latency (in seconds), including connection acquisition
    pub call_duration_seconds: HistogramVec,

    // Health check metrics
    /// Health check results by datasource
    pub health_checks_total: IntCounterVec,
    /// Current datasource counts by health status
    pub datasources: IntGaugeVec,
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> Self {
        let registry = Registry::new();

        let routes_total = IntCounterVec::new(
            Opts::new(
                "athena_router_routes_total",
                "Total number of calls routed to a datasource",
            ),
            &["role", "datasource", "pinned"],
        )
        .unwrap();

        let route_errors_total = IntCounterVec::new(
            Opts::new(
                "athena_router_route_errors_total",
                "Total number of routing failures",
            ),
            &["kind"], // not_registered, no_healthy_candidate, connection
        )
        .unwrap();

        let call_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "athena_router_call_duration_seconds",
                "Routed call latency in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
                10.0,
            ]),
            &["datasource", "outcome"],
        )
        .unwrap();

        let health_checks_total = IntCounterVec::new(
            Opts::new(
                "athena_router_health_checks_total",
                "Total number of health checks by result",
            ),
            &["datasource", "result"], // success, failure
        )
        .unwrap();

        let datasources = IntGaugeVec::new(
            Opts::new(
                "athena_router_datasources",
                "Current number of datasources by health status",
            ),
            &["status"], // healthy, unhealthy, unknown
        )
        .unwrap();

        registry.register(Box::new(routes_total.clone())).unwrap();
        registry
            .register(Box::new(route_errors_total.clone()))
            .unwrap();
        registry
            .register(Box::new(call_duration_seconds.clone()))
            .unwrap();
        registry
            .register(Box::new(health_checks_total.clone()))
            .unwrap();
        registry.register(Box::new(datasources.clone())).unwrap();

        Self {
            registry,
            routes_total,
            route_errors_total,
            call_duration_seconds,
            health_checks_total,
            datasources,
        }
    }

    /// Record a routing decision
    pub fn record_route(&self, role: &str, datasource: &str, pinned: bool) {
        let pinned = if pinned { "true" } else { "false" };
        self.routes_total
            .with_label_values(&[role, datasource, pinned])
            .inc();
    }

    /// Record a routing failure
    pub fn record_route_error(&self, kind: &str) {
        self.route_errors_total.with_label_values(&[kind]).inc();
    }

    /// Record a completed routed call
    pub fn record_call(&self, datasource: &str, ok: bool, duration_secs: f64) {
        let outcome = if ok { "completed" } else { "failed" };
        self.call_duration_seconds
            .with_label_values(&[datasource, outcome])
            .observe(duration_secs);
    }

    /// Record a health check result
    pub fn record_health_check(&self, datasource: &str, ok: bool) {
        let result = if ok { "success" } else { "failure" };
        self.health_checks_total
            .with_label_values(&[datasource, result])
            .inc();
    }

    /// Update datasource counts per health status
    pub fn set_datasource_counts(&self, healthy: usize, unhealthy: usize, unknown: usize) {
        self.datasources
            .with_label_values(&["healthy"])
            .set(healthy as i64);
        self.datasources
            .with_label_values(&["unhealthy"])
            .set(unhealthy as i64);
        self.datasources
            .with_label_values(&["unknown"])
            .set(unknown as i64);
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
