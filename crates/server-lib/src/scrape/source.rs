//! Bounded fan-out over a node scraper

use super::{async_trait, MetricsBatch, NodeScraper, SampleSource, ScrapeError};
use crate::models::NodeInfo;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

/// Limits applied to one scrape round
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Maximum number of nodes scraped at the same time
    pub max_concurrent: usize,
    /// Time allowed for a single node
    pub node_timeout: Duration,
    /// Time allowed for the whole round
    pub round_deadline: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 32,
            node_timeout: Duration::from_secs(10),
            round_deadline: Duration::from_secs(13),
        }
    }
}

/// [`SampleSource`] that scrapes every node through a [`NodeScraper`]
pub struct ScrapingSource<S> {
    scraper: S,
    config: SourceConfig,
}

impl<S: NodeScraper> ScrapingSource<S> {
    pub fn new(scraper: S, config: SourceConfig) -> Self {
        Self { scraper, config }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn scraper(&self) -> &S {
        &self.scraper
    }
}

#[async_trait]
impl<S: NodeScraper> SampleSource for ScrapingSource<S> {
    async fn get_metrics(&self, nodes: &[NodeInfo]) -> MetricsBatch {
        let deadline = Instant::now() + self.config.round_deadline;
        let node_timeout = self.config.node_timeout;
        let scraper = &self.scraper;

        let mut pending = stream::iter(nodes.iter().cloned())
            .map(|node: NodeInfo| async move {
                let outcome = match timeout(node_timeout, scraper.scrape(&node)).await {
                    Ok(result) => result,
                    Err(_) => Err(ScrapeError::Timeout(node_timeout)),
                };
                (node.name, outcome)
            })
            .buffer_unordered(self.config.max_concurrent.max(1));

        let mut batch = HashMap::with_capacity(nodes.len());
        loop {
            match timeout_at(deadline, pending.next()).await {
                Ok(Some((name, outcome))) => {
                    batch.insert(name, outcome);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        completed = batch.len(),
                        total = nodes.len(),
                        "Scrape round deadline reached, keeping partial results"
                    );
                    break;
                }
            }
        }

        for node in nodes {
            batch
                .entry(node.name.clone())
                .or_insert(Err(ScrapeError::DeadlineExceeded));
        }

        debug!(nodes = nodes.len(), "Scrape round finished");
        batch
    }
}
