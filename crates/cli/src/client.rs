//! API client for the metrics server

use anyhow::{Context, Result};
use reqwest::{header, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Prefix of the resource metrics API
pub const API_PREFIX: &str = "apis/metrics.k8s.io/v1beta1";

/// `Accept` header asking the server for the table form
pub const TABLE_ACCEPT: &str = "application/json;as=Table;v=v1;g=meta.k8s.io, application/json";

/// Error reported by the server in a `Status` body
#[derive(Debug, Error)]
#[error("{reason} ({code}): {message}")]
pub struct ServerError {
    pub code: u16,
    pub reason: String,
    pub message: String,
}

/// API client for the metrics server
pub struct MetricsClient {
    client: Client,
    base_url: Url,
}

impl MetricsClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(base_url).context("Invalid server URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, path: &str, label_selector: Option<&str>) -> Result<RequestBuilder> {
        let url = self
            .base_url
            .join(&format!("{}/{}", API_PREFIX, path))
            .context("Invalid path")?;

        let mut request = self.client.get(url);
        if let Some(selector) = label_selector {
            request = request.query(&[("labelSelector", selector)]);
        }
        Ok(request)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await.context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<StatusBody>(&body) {
                Ok(parsed) => ServerError {
                    code: parsed.code,
                    reason: parsed.reason,
                    message: parsed.message,
                }
                .into(),
                Err(_) => anyhow::anyhow!("API error ({}): {}", status, body),
            });
        }

        response.json().await.context("Failed to parse response")
    }

    /// Fetch a resource path as JSON
    pub async fn get<T: DeserializeOwned>(&self, path: &str, label_selector: Option<&str>) -> Result<T> {
        Self::send(self.request(path, label_selector)?).await
    }

    /// Fetch a resource path in table form
    pub async fn get_table(
        &self,
        path: &str,
        label_selector: Option<&str>,
        no_headers: bool,
    ) -> Result<Table> {
        let mut request = self
            .request(path, label_selector)?
            .header(header::ACCEPT, TABLE_ACCEPT);
        if no_headers {
            request = request.query(&[("noHeaders", "true")]);
        }
        Self::send(request).await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBody {
    pub code: u16,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(default)]
    pub column_definitions: Vec<TableColumn>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerMetrics {
    pub name: String,
    pub usage: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetrics {
    pub metadata: ObjectMeta,
    pub window: String,
    pub containers: Vec<ContainerMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetricsList {
    pub items: Vec<PodMetrics>,
}
