//! Plain HTTP scraper for node agents

use super::{async_trait, NodeScraper, ScrapeError};
use crate::models::{NodeInfo, NodeSample};
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

/// Path of the usage summary served by each node agent
pub const SUMMARY_PATH: &str = "/metrics/resource/summary";

/// Connection settings for node agents
#[derive(Debug, Clone)]
pub struct HttpScraperConfig {
    pub scheme: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Default for HttpScraperConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            port: 10250,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Fetches `NodeSample` JSON from `{scheme}://{address}:{port}/metrics/resource/summary`
pub struct HttpNodeScraper {
    client: Client,
    config: HttpScraperConfig,
}

impl HttpNodeScraper {
    pub fn new(config: HttpScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    fn url(&self, node: &NodeInfo) -> String {
        format!(
            "{}://{}:{}{}",
            self.config.scheme,
            node.address(),
            self.config.port,
            SUMMARY_PATH
        )
    }
}

#[async_trait]
impl NodeScraper for HttpNodeScraper {
    async fn scrape(&self, node: &NodeInfo) -> Result<NodeSample, ScrapeError> {
        let response = self
            .client
            .get(self.url(node))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ScrapeError::Timeout(self.config.timeout)
                } else {
                    ScrapeError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ScrapeError::Status(response.status().as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ScrapeError::Transport(e.to_string()))?;

        serde_json::from_slice(&body).map_err(|e| ScrapeError::Malformed(e.to_string()))
    }
}
