//! External `metrics.k8s.io/v1beta1` representation
//!
//! These are the objects handed to the hosting HTTP layer. Converting from
//! snapshot entries is a pure mapping; no field here is computed on the
//! read path other than the creation timestamp, which is the serve time.

use crate::models::{Labels, NodeMetric, PodMetric};
use crate::quantity::ResourceList;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const API_VERSION: &str = "metrics.k8s.io/v1beta1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    pub creation_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    pub kind: String,
    pub api_version: String,
    pub metadata: ObjectMeta,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub usage: ResourceList,
}

impl NodeMetrics {
    pub(crate) fn from_metric(metric: &NodeMetric, labels: Labels, served_at: DateTime<Utc>) -> Self {
        Self {
            kind: "NodeMetrics".to_string(),
            api_version: API_VERSION.to_string(),
            metadata: ObjectMeta {
                name: metric.name.clone(),
                namespace: None,
                labels,
                creation_timestamp: served_at,
            },
            timestamp: metric.window.timestamp,
            window: metric.window.window,
            usage: metric.resources.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetricsList {
    pub kind: String,
    pub api_version: String,
    pub items: Vec<NodeMetrics>,
}

impl NodeMetricsList {
    pub fn new(items: Vec<NodeMetrics>) -> Self {
        Self {
            kind: "NodeMetricsList".to_string(),
            api_version: API_VERSION.to_string(),
            items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetrics {
    pub name: String,
    pub usage: ResourceList,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodMetrics {
    pub kind: String,
    pub api_version: String,
    pub metadata: ObjectMeta,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub containers: Vec<ContainerMetrics>,
}

impl PodMetrics {
    pub(crate) fn from_metric(metric: &PodMetric, labels: Labels, served_at: DateTime<Utc>) -> Self {
        Self {
            kind: "PodMetrics".to_string(),
            api_version: API_VERSION.to_string(),
            metadata: ObjectMeta {
                name: metric.name.clone(),
                namespace: Some(metric.namespace.clone()),
                labels,
                creation_timestamp: served_at,
            },
            timestamp: metric.window.timestamp,
            window: metric.window.window,
            containers: metric
                .containers
                .iter()
                .map(|c| ContainerMetrics {
                    name: c.name.clone(),
                    usage: c.resources.clone(),
                })
                .collect(),
        }
    }

    /// Sum of all container usage
    pub fn total_usage(&self) -> ResourceList {
        crate::quantity::sum_resources(self.containers.iter().map(|c| &c.usage))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodMetricsList {
    pub kind: String,
    pub api_version: String,
    pub items: Vec<PodMetrics>,
}

impl PodMetricsList {
    pub fn new(items: Vec<PodMetrics>) -> Self {
        Self {
            kind: "PodMetricsList".to_string(),
            api_version: API_VERSION.to_string(),
            items,
        }
    }
}
