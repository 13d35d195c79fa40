//! Server configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use server_lib::scrape::{AllFailedPolicy, HttpScraperConfig, ScrapeConfig, SourceConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration, read from `METRICS_SERVER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port for the metrics API, health and Prometheus endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Time between scrape cycle starts in seconds
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval_secs: u64,

    /// Time allowed for a single node in seconds
    #[serde(default = "default_node_timeout")]
    pub node_timeout_secs: u64,

    /// Time allowed for a whole scrape round; defaults to 90% of the interval
    #[serde(default)]
    pub round_deadline_secs: Option<f64>,

    #[serde(default = "default_max_concurrent_scrapes")]
    pub max_concurrent_scrapes: usize,

    /// Port of the node agent serving usage summaries
    #[serde(default = "default_kubelet_port")]
    pub kubelet_port: u16,

    #[serde(default = "default_kubelet_scheme")]
    pub kubelet_scheme: String,

    /// Cluster inventory file listing nodes and pods
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    #[serde(default)]
    pub all_failed_policy: AllFailedPolicy,
}

fn default_api_port() -> u16 {
    8080
}

fn default_scrape_interval() -> u64 {
    15
}

fn default_node_timeout() -> u64 {
    10
}

fn default_max_concurrent_scrapes() -> usize {
    32
}

fn default_kubelet_port() -> u16 {
    10250
}

fn default_kubelet_scheme() -> String {
    "http".to_string()
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("/etc/metrics-server/inventory.json")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            scrape_interval_secs: default_scrape_interval(),
            node_timeout_secs: default_node_timeout(),
            round_deadline_secs: None,
            max_concurrent_scrapes: default_max_concurrent_scrapes(),
            kubelet_port: default_kubelet_port(),
            kubelet_scheme: default_kubelet_scheme(),
            registry_path: default_registry_path(),
            all_failed_policy: AllFailedPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix("METRICS_SERVER"))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read configuration")?;

        let loaded: Self = config
            .try_deserialize()
            .context("Invalid metrics server configuration")?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<()> {
        if self.scrape_interval_secs == 0 {
            anyhow::bail!("scrape_interval_secs must be greater than zero");
        }
        if self.max_concurrent_scrapes == 0 {
            anyhow::bail!("max_concurrent_scrapes must be greater than zero");
        }
        if matches!(self.round_deadline_secs, Some(d) if d <= 0.0) {
            anyhow::bail!("round_deadline_secs must be positive");
        }
        Ok(())
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval_secs)
    }

    pub fn round_deadline(&self) -> Duration {
        self.round_deadline_secs
            .map(Duration::from_secs_f64)
            .unwrap_or_else(|| self.scrape_interval().mul_f64(0.9))
    }

    pub fn scrape_config(&self) -> ScrapeConfig {
        ScrapeConfig {
            interval: self.scrape_interval(),
            all_failed_policy: self.all_failed_policy,
        }
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            max_concurrent: self.max_concurrent_scrapes,
            node_timeout: Duration::from_secs(self.node_timeout_secs),
            round_deadline: self.round_deadline(),
        }
    }

    pub fn http_scraper_config(&self) -> HttpScraperConfig {
        HttpScraperConfig {
            scheme: self.kubelet_scheme.clone(),
            port: self.kubelet_port,
            timeout: Duration::from_secs(self.node_timeout_secs),
        }
    }
}
