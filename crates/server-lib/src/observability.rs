//! Observability infrastructure for the metrics server
//!
//! Provides:
//! - Prometheus metrics for scrape cycles (duration, failures, overruns, staleness)
//! - The served-sample freshness histogram
//! - Structured JSON logging of server events with tracing

use chrono::{DateTime, Utc};
use prometheus::{
    exponential_buckets, register_gauge, register_histogram, register_int_counter,
    register_int_counter_vec, register_int_gauge, Gauge, Histogram, HistogramOpts, HistogramVec,
    IntCounter, IntCounterVec, IntGauge, Registry,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Histogram buckets for scrape cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServerMetricsInner> = OnceLock::new();

/// Global freshness histogram (registered once)
static GLOBAL_FRESHNESS: OnceLock<FreshnessHistogram> = OnceLock::new();

struct ServerMetricsInner {
    scrape_duration_seconds: Histogram,
    node_scrape_failures: IntCounterVec,
    cycle_overruns: IntCounter,
    nodes_scraped: IntGauge,
    pods_scraped: IntGauge,
    snapshot_stale: IntGauge,
    last_successful_cycle: Gauge,
}

impl ServerMetricsInner {
    fn new() -> Self {
        Self {
            scrape_duration_seconds: register_histogram!(
                "metrics_server_scrape_duration_seconds",
                "Time spent on one full scrape cycle across all nodes",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register scrape_duration_seconds"),

            node_scrape_failures: register_int_counter_vec!(
                "metrics_server_node_scrape_failures_total",
                "Total number of failed node scrapes by reason",
                &["reason"]
            )
            .expect("Failed to register node_scrape_failures_total"),

            cycle_overruns: register_int_counter!(
                "metrics_server_cycle_overruns_total",
                "Scrape cycles that took longer than the scrape interval"
            )
            .expect("Failed to register cycle_overruns_total"),

            nodes_scraped: register_int_gauge!(
                "metrics_server_nodes_scraped",
                "Nodes present in the current snapshot"
            )
            .expect("Failed to register nodes_scraped"),

            pods_scraped: register_int_gauge!(
                "metrics_server_pods_scraped",
                "Pods present in the current snapshot"
            )
            .expect("Failed to register pods_scraped"),

            snapshot_stale: register_int_gauge!(
                "metrics_server_snapshot_stale",
                "1 when the served snapshot is left over from an earlier cycle"
            )
            .expect("Failed to register snapshot_stale"),

            last_successful_cycle: register_gauge!(
                "metrics_server_last_successful_cycle_timestamp_seconds",
                "Unix time of the last cycle that published fresh data"
            )
            .expect("Failed to register last_successful_cycle_timestamp_seconds"),
        }
    }
}

/// Scrape metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ServerMetrics {
    _private: (),
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServerMetricsInner {
        GLOBAL_METRICS.get_or_init(ServerMetricsInner::new)
    }

    pub fn observe_cycle_duration(&self, elapsed: Duration) {
        self.inner()
            .scrape_duration_seconds
            .observe(elapsed.as_secs_f64());
    }

    pub fn inc_node_failure(&self, reason: &str) {
        self.inner()
            .node_scrape_failures
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_cycle_overrun(&self) {
        self.inner().cycle_overruns.inc();
    }

    pub fn set_snapshot_size(&self, nodes: usize, pods: usize) {
        self.inner().nodes_scraped.set(nodes as i64);
        self.inner().pods_scraped.set(pods as i64);
    }

    pub fn set_stale(&self, stale: bool) {
        self.inner().snapshot_stale.set(i64::from(stale));
    }

    pub fn set_last_successful_cycle(&self, at: DateTime<Utc>) {
        self.inner()
            .last_successful_cycle
            .set(at.timestamp_millis() as f64 / 1000.0);
    }
}

/// Name of the freshness histogram
pub const FRESHNESS_METRIC: &str = "metrics_server_api_metric_freshness_seconds";

/// Age of served samples, labelled by resource (`nodes` or `pods`)
///
/// Each instance owns its collector, so tests can build isolated ones
/// instead of sharing the process-wide histogram.
#[derive(Clone)]
pub struct FreshnessHistogram {
    histogram: HistogramVec,
}

impl Default for FreshnessHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl FreshnessHistogram {
    /// Bucket boundaries: 1s growing by 36.4% per bucket, 20 buckets (~6 min)
    pub fn buckets() -> Vec<f64> {
        exponential_buckets(1.0, 1.364, 20).unwrap_or_default()
    }

    /// Create an unregistered histogram
    pub fn new() -> Self {
        let opts = HistogramOpts::new(FRESHNESS_METRIC, "Freshness of metrics exported")
            .buckets(Self::buckets());
        Self {
            histogram: HistogramVec::new(opts, &["resource"])
                .expect("Failed to build metric_freshness_seconds"),
        }
    }

    /// The process-wide histogram, registered in the default registry
    pub fn global() -> Self {
        GLOBAL_FRESHNESS
            .get_or_init(|| {
                let freshness = Self::new();
                if let Err(e) = freshness.register(prometheus::default_registry()) {
                    warn!(error = %e, "Failed to register freshness histogram");
                }
                freshness
            })
            .clone()
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.histogram.clone()))
    }

    /// Record the age of one served sample; negative ages count as zero
    pub fn observe(&self, resource: &str, served_at: DateTime<Utc>, sampled_at: DateTime<Utc>) {
        let age = (served_at - sampled_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.histogram.with_label_values(&[resource]).observe(age);
    }

    pub fn reset(&self) {
        self.histogram.reset();
    }

    /// Sample count and sum for one resource label
    pub fn snapshot(&self, resource: &str) -> (u64, f64) {
        let h = self.histogram.with_label_values(&[resource]);
        (h.get_sample_count(), h.get_sample_sum())
    }
}

/// Structured logger for server events
///
/// Provides consistent JSON-formatted logging for scrape cycles,
/// node failures, and lifecycle events.
#[derive(Clone, Default)]
pub struct EventLogger;

impl EventLogger {
    pub fn new() -> Self {
        Self
    }

    /// Log server startup
    pub fn log_startup(&self, version: &str, scrape_interval: Duration) {
        info!(
            event = "server_started",
            server_version = %version,
            scrape_interval_secs = scrape_interval.as_secs_f64(),
            "Metrics server started"
        );
    }

    /// Log server shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            reason = %reason,
            "Metrics server shutting down"
        );
    }

    /// Log the outcome of one scrape cycle
    pub fn log_cycle(&self, nodes_ok: usize, pods_ok: usize, failures: usize, elapsed: Duration) {
        info!(
            event = "scrape_cycle_complete",
            nodes = nodes_ok,
            pods = pods_ok,
            failures = failures,
            elapsed_ms = elapsed.as_millis() as u64,
            "Scrape cycle complete"
        );
    }

    /// Log one node that could not be scraped
    pub fn log_node_failure(&self, node: &str, reason: &str, error: &dyn std::fmt::Display) {
        warn!(
            event = "node_scrape_failed",
            node = %node,
            reason = %reason,
            error = %error,
            "Failed to scrape node"
        );
    }

    /// Log a cycle that ran past its tick
    pub fn log_overrun(&self, elapsed: Duration, interval: Duration) {
        warn!(
            event = "scrape_cycle_overrun",
            elapsed_ms = elapsed.as_millis() as u64,
            interval_ms = interval.as_millis() as u64,
            "Scrape cycle exceeded interval, next tick skipped"
        );
    }

    /// Log that every node failed and older data keeps being served
    pub fn log_stale(&self, snapshot_completed_at: DateTime<Utc>) {
        warn!(
            event = "snapshot_stale",
            snapshot_completed_at = %snapshot_completed_at.to_rfc3339(),
            "All node scrapes failed, serving previous snapshot"
        );
    }
}
