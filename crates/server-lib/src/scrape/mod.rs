//! Metrics collection from node agents
//!
//! A [`SampleSource`] answers one batched request for a set of nodes. The
//! provided [`ScrapingSource`] fans that request out to a [`NodeScraper`]
//! with bounded parallelism, per-node timeouts and a round deadline. The
//! [`ScrapeDriver`] runs one such round per tick and publishes the result.

mod driver;
mod http;
mod source;


pub use driver::{
    AllFailedPolicy, CycleOutcome, CycleReport, NodeFailure, ScrapeConfig, ScrapeDriver,
    ScrapeDriverBuilder,
};
pub use http::{HttpNodeScraper, HttpScraperConfig};
pub use source::{ScrapingSource, SourceConfig};

use crate::models::{NodeInfo, NodeSample};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub use async_trait::async_trait;

/// Why one node produced no data this cycle
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScrapeError {
    #[error("node did not answer within {0:?}")]
    Timeout(Duration),
    #[error("scrape round deadline passed before the node answered")]
    DeadlineExceeded,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("no data returned for node")]
    NoData,
    #[error("sample timestamp {sample} is after cycle completion {completed}")]
    FutureTimestamp {
        sample: DateTime<Utc>,
        completed: DateTime<Utc>,
    },
}

impl ScrapeError {
    /// Short label used for the failure counter
    pub fn reason(&self) -> &'static str {
        match self {
            ScrapeError::Timeout(_) => "timeout",
            ScrapeError::DeadlineExceeded => "deadline_exceeded",
            ScrapeError::Transport(_) => "transport",
            ScrapeError::Status(_) => "http_status",
            ScrapeError::Malformed(_) => "malformed",
            ScrapeError::NoData => "no_data",
            ScrapeError::FutureTimestamp { .. } => "future_timestamp",
        }
    }
}

/// Per-node results of one batched request; a missing entry means no data
pub type MetricsBatch = HashMap<String, Result<NodeSample, ScrapeError>>;

/// Fetches and decodes the usage payload of a single node
#[async_trait]
pub trait NodeScraper: Send + Sync {
    async fn scrape(&self, node: &NodeInfo) -> Result<NodeSample, ScrapeError>;
}

/// Collects samples for a whole set of nodes in one call
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn get_metrics(&self, nodes: &[NodeInfo]) -> MetricsBatch;
}
