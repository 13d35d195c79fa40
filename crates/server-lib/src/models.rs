//! Core data models for the metrics server

use crate::quantity::{sum_resources, ResourceList};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Label mapping attached to nodes and pods
pub type Labels = BTreeMap<String, String>;

/// When a measurement period ended and how long it spanned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleWindow {
    pub timestamp: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl SampleWindow {
    pub fn new(timestamp: DateTime<Utc>, window: Duration) -> Self {
        Self { timestamp, window }
    }
}

/// Resource usage of one container as reported by a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSample {
    pub name: String,
    #[serde(default)]
    pub resources: ResourceList,
}

/// Resource usage of one pod as reported by a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSample {
    pub namespace: String,
    pub name: String,
    #[serde(flatten)]
    pub window: SampleWindow,
    #[serde(default)]
    pub containers: Vec<ContainerSample>,
}

/// Everything a single node returned in one scrape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSample {
    #[serde(flatten)]
    pub window: SampleWindow,
    #[serde(default)]
    pub resources: ResourceList,
    #[serde(default)]
    pub pods: Vec<PodSample>,
}

/// Node as known to the cluster registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    /// Host or IP used to reach the node's agent; defaults to the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, labels: Labels) -> Self {
        Self {
            name: name.into(),
            labels,
            address: None,
        }
    }

    pub fn address(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.name)
    }
}

/// Pod as known to the cluster registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

impl PodInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, labels: Labels) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels,
            node_name: None,
        }
    }
}

/// Node usage held in a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMetric {
    pub name: String,
    /// Labels copied from the registry when the snapshot was built
    pub labels: Labels,
    pub window: SampleWindow,
    pub resources: ResourceList,
}

/// Container usage held in a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerMetric {
    pub name: String,
    pub resources: ResourceList,
}

/// Pod usage held in a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct PodMetric {
    pub namespace: String,
    pub name: String,
    pub labels: Labels,
    pub window: SampleWindow,
    pub containers: Vec<ContainerMetric>,
    /// Sum over all containers
    pub aggregate: ResourceList,
}

impl PodMetric {
    pub fn from_sample(sample: PodSample, labels: Labels) -> Self {
        let containers: Vec<ContainerMetric> = sample
            .containers
            .into_iter()
            .map(|c| ContainerMetric {
                name: c.name,
                resources: c.resources,
            })
            .collect();
        let aggregate = sum_resources(containers.iter().map(|c| &c.resources));

        Self {
            namespace: sample.namespace,
            name: sample.name,
            labels,
            window: sample.window,
            containers,
            aggregate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::{Quantity, RESOURCE_CPU, RESOURCE_MEMORY};

    #[test]
    fn test_node_sample_from_json() {
        let json = r#"{
            "timestamp": "2024-05-01T10:00:00Z",
            "window": "10s",
            "resources": {"cpu": "250m", "memory": "512Mi"},
            "pods": [{
                "namespace": "default",
                "name": "web-0",
                "timestamp": "2024-05-01T09:59:58Z",
                "window": "15s",
                "containers": [{"name": "app", "resources": {"cpu": "100m"}}]
            }]
        }"#;

        let sample: NodeSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.window.window, Duration::from_secs(10));
        assert_eq!(sample.resources[RESOURCE_CPU], Quantity::from_milli(250));
        assert_eq!(sample.resources[RESOURCE_MEMORY].to_string(), "512Mi");
        assert_eq!(sample.pods.len(), 1);
        assert_eq!(sample.pods[0].window.window, Duration::from_secs(15));
        assert_eq!(sample.pods[0].containers[0].name, "app");
    }

    #[test]
    fn test_pod_metric_aggregates_containers() {
        let window = SampleWindow::new(Utc::now(), Duration::from_secs(10));
        let sample = PodSample {
            namespace: "default".to_string(),
            name: "web-0".to_string(),
            window,
            containers: vec![
                ContainerSample {
                    name: "app".to_string(),
                    resources: [
                        (RESOURCE_CPU.to_string(), Quantity::from_milli(100)),
                        (RESOURCE_MEMORY.to_string(), Quantity::from_bytes(64 << 20)),
                    ]
                    .into(),
                },
                ContainerSample {
                    name: "sidecar".to_string(),
                    resources: [(RESOURCE_CPU.to_string(), Quantity::from_milli(5))].into(),
                },
            ],
        };

        let metric = PodMetric::from_sample(sample, Labels::new());
        assert_eq!(metric.containers.len(), 2);
        assert_eq!(metric.aggregate[RESOURCE_CPU].to_string(), "105m");
        assert_eq!(metric.aggregate[RESOURCE_MEMORY].to_string(), "64Mi");
    }

    #[test]
    fn test_node_info_address_defaults_to_name() {
        let mut node = NodeInfo::new("node-a", Labels::new());
        assert_eq!(node.address(), "node-a");

        node.address = Some("10.0.0.4".to_string());
        assert_eq!(node.address(), "10.0.0.4");
    }
}
