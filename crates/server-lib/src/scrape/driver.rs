//! Scrape cycle driver
//!
//! Runs one collection round per tick, builds a snapshot from the nodes that
//! answered and publishes it to the store. Rounds never overlap: a round that
//! runs past the next tick causes that tick to be skipped.

use super::{SampleSource, ScrapeError};
use crate::clock::{Clock, SystemClock};
use crate::health::HealthRegistry;
use crate::models::{NodeMetric, PodMetric, PodSample};
use crate::observability::{EventLogger, ServerMetrics};
use crate::registry::NodeRegistry;
use crate::store::{MetricsStore, Snapshot};
use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// What to publish when every node failed in a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllFailedPolicy {
    /// Keep serving the previous snapshot, flagged stale
    #[default]
    KeepPrevious,
    /// Replace the previous snapshot with an empty one
    PublishEmpty,
}

/// Configuration for the scrape driver
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Time between cycle starts (default: 15 seconds)
    pub interval: Duration,
    pub all_failed_policy: AllFailedPolicy,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            all_failed_policy: AllFailedPolicy::default(),
        }
    }
}

/// A node that produced no data in a cycle
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    pub node: String,
    pub error: ScrapeError,
}

/// What a cycle ended up publishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A snapshot built from this cycle's data was installed
    Published,
    /// Every node failed; the previous snapshot stays, flagged stale
    KeptStale,
    /// Every node failed; an empty snapshot was installed
    PublishedEmpty,
}

/// Summary of one scrape cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub nodes_ok: usize,
    pub pods_ok: usize,
    pub failures: Vec<NodeFailure>,
    pub elapsed: Duration,
    pub outcome: CycleOutcome,
    /// Set by the run loop when the cycle outlasted the interval
    pub overrun: bool,
}

/// Periodically scrapes all registered nodes into the metrics store
pub struct ScrapeDriver {
    source: Arc<dyn SampleSource>,
    registry: Arc<dyn NodeRegistry>,
    store: Arc<MetricsStore>,
    clock: Arc<dyn Clock>,
    config: ScrapeConfig,
    health: Option<HealthRegistry>,
    reports: Option<mpsc::Sender<CycleReport>>,
    metrics: ServerMetrics,
    logger: EventLogger,
}

impl ScrapeDriver {
    /// Run cycles until a shutdown signal arrives.
    ///
    /// The first cycle starts one interval after the call; callers run
    /// [`ScrapeDriver::run_cycle`] themselves for an immediate startup scrape.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            "Starting scrape loop"
        );

        let mut ticker = interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let mut report = self.run_cycle().await;

                    if report.elapsed > self.config.interval {
                        report.overrun = true;
                        self.metrics.inc_cycle_overrun();
                        self.logger.log_overrun(report.elapsed, self.config.interval);
                    }

                    if let Some(tx) = &self.reports {
                        let _ = tx.try_send(report);
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down scrape loop");
                    break;
                }
            }
        }
    }

    /// Scrape every registered node once and publish the result
    pub async fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();
        let nodes = self.registry.list_nodes();

        let mut batch = if nodes.is_empty() {
            HashMap::new()
        } else {
            self.source.get_metrics(&nodes).await
        };
        let completed_at = self.clock.now();

        let mut failures = Vec::new();
        let mut node_metrics = Vec::with_capacity(nodes.len());
        let mut pod_samples = Vec::new();

        for node in &nodes {
            let sample = match batch.remove(&node.name) {
                Some(Ok(sample)) => sample,
                Some(Err(error)) => {
                    failures.push(NodeFailure {
                        node: node.name.clone(),
                        error,
                    });
                    continue;
                }
                None => {
                    failures.push(NodeFailure {
                        node: node.name.clone(),
                        error: ScrapeError::NoData,
                    });
                    continue;
                }
            };

            if sample.window.timestamp > completed_at {
                failures.push(NodeFailure {
                    node: node.name.clone(),
                    error: ScrapeError::FutureTimestamp {
                        sample: sample.window.timestamp,
                        completed: completed_at,
                    },
                });
                continue;
            }

            pod_samples.extend(
                sample
                    .pods
                    .into_iter()
                    .filter(|pod| pod.window.timestamp <= completed_at),
            );
            node_metrics.push(NodeMetric {
                name: node.name.clone(),
                labels: node.labels.clone(),
                window: sample.window,
                resources: sample.resources,
            });
        }

        let pod_metrics = self.correlate_pods(pod_samples);

        for failure in &failures {
            self.metrics.inc_node_failure(failure.error.reason());
            self.logger
                .log_node_failure(&failure.node, failure.error.reason(), &failure.error);
        }

        let all_failed = !nodes.is_empty() && node_metrics.is_empty();
        let (nodes_ok, pods_ok) = (node_metrics.len(), pod_metrics.len());

        let outcome = match (all_failed, self.config.all_failed_policy) {
            (true, AllFailedPolicy::KeepPrevious) => {
                let previous = self.store.read();
                self.logger.log_stale(previous.completed_at());
                self.store.replace(previous.mark_stale());
                CycleOutcome::KeptStale
            }
            (true, AllFailedPolicy::PublishEmpty) => {
                self.store.replace(Snapshot::empty(completed_at));
                CycleOutcome::PublishedEmpty
            }
            (false, _) => {
                self.store
                    .replace(Snapshot::new(node_metrics, pod_metrics, completed_at));
                self.metrics.set_last_successful_cycle(completed_at);
                CycleOutcome::Published
            }
        };

        let served = self.store.read();
        self.metrics
            .set_snapshot_size(served.nodes().len(), served.pods().len());
        self.metrics.set_stale(served.is_stale());

        if let Some(health) = &self.health {
            let kept_previous = outcome == CycleOutcome::KeptStale;
            health
                .record_cycle(nodes.len(), failures.len(), kept_previous)
                .await;
        }

        let elapsed = start.elapsed();
        self.metrics.observe_cycle_duration(elapsed);
        self.logger.log_cycle(nodes_ok, pods_ok, failures.len(), elapsed);

        CycleReport {
            nodes_ok,
            pods_ok,
            failures,
            elapsed,
            outcome,
            overrun: false,
        }
    }

    /// Keep the pods the registry knows about, in registry order
    fn correlate_pods(&self, samples: Vec<PodSample>) -> Vec<PodMetric> {
        let known = self.registry.list_pods();
        let index: HashMap<(&str, &str), usize> = known
            .iter()
            .enumerate()
            .map(|(i, pod)| ((pod.namespace.as_str(), pod.name.as_str()), i))
            .collect();

        let mut matched: HashMap<usize, PodSample> = HashMap::new();
        for sample in samples {
            let Some(&position) = index.get(&(sample.namespace.as_str(), sample.name.as_str()))
            else {
                debug!(
                    namespace = %sample.namespace,
                    pod = %sample.name,
                    "Dropping sample for pod unknown to the registry"
                );
                continue;
            };

            // A pod reported twice (e.g. mid-migration) keeps the newest sample.
            match matched.get(&position) {
                Some(existing) if existing.window.timestamp >= sample.window.timestamp => {}
                _ => {
                    matched.insert(position, sample);
                }
            }
        }

        let mut positions: Vec<usize> = matched.keys().copied().collect();
        positions.sort_unstable();
        positions
            .into_iter()
            .filter_map(|i| {
                let sample = matched.remove(&i)?;
                Some(PodMetric::from_sample(sample, known[i].labels.clone()))
            })
            .collect()
    }
}

/// Builder for creating the scrape driver
pub struct ScrapeDriverBuilder {
    source: Option<Arc<dyn SampleSource>>,
    registry: Option<Arc<dyn NodeRegistry>>,
    store: Option<Arc<MetricsStore>>,
    clock: Arc<dyn Clock>,
    config: ScrapeConfig,
    health: Option<HealthRegistry>,
    reports: Option<mpsc::Sender<CycleReport>>,
}

impl ScrapeDriverBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            source: None,
            registry: None,
            store: None,
            clock: Arc::new(SystemClock),
            config: ScrapeConfig::default(),
            health: None,
            reports: None,
        }
    }

    /// Set the sample source
    pub fn source(mut self, source: Arc<dyn SampleSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the node registry
    pub fn registry(mut self, registry: Arc<dyn NodeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the store snapshots are published to
    pub fn store(mut self, store: Arc<MetricsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the scrape interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn all_failed_policy(mut self, policy: AllFailedPolicy) -> Self {
        self.config.all_failed_policy = policy;
        self
    }

    /// Report cycle outcomes to a health registry
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Send a report after every cycle run by the loop
    pub fn reports(mut self, tx: mpsc::Sender<CycleReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Build the scrape driver
    pub fn build(self) -> Result<ScrapeDriver> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Sample source is required"))?;
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("Registry is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Metrics store is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Scrape interval must be greater than zero");
        }

        Ok(ScrapeDriver {
            source,
            registry,
            store,
            clock: self.clock,
            config: self.config,
            health: self.health,
            reports: self.reports,
            metrics: ServerMetrics::new(),
            logger: EventLogger::new(),
        })
    }
}

impl Default for ScrapeDriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}
