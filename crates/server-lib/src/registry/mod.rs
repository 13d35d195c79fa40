//! Cluster inventory of nodes and pods
//!
//! The registry is the read-only view of which nodes exist and what labels
//! nodes and pods carry. It is fed from outside (an inventory file watcher in
//! the server binary) and only read by the scrape driver and the query layer.

mod watcher;

pub use watcher::{RegistryFile, RegistryWatcher, WatcherHandle};

use crate::models::{NodeInfo, PodInfo};
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;

/// Read access to known nodes and pods
pub trait NodeRegistry: Send + Sync {
    /// All known nodes, ordered by name
    fn list_nodes(&self) -> Vec<NodeInfo>;

    fn get_node(&self, name: &str) -> Option<NodeInfo>;

    /// All known pods, ordered by namespace then name
    fn list_pods(&self) -> Vec<PodInfo>;

    fn get_pod(&self, namespace: &str, name: &str) -> Option<PodInfo>;
}

type PodKey = (String, String);

/// In-memory registry of nodes and pods
#[derive(Debug, Default)]
pub struct ClusterRegistry {
    /// Map of node name -> NodeInfo
    nodes: DashMap<String, NodeInfo>,
    /// Map of (namespace, name) -> PodInfo
    pods: DashMap<PodKey, PodInfo>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a node
    pub fn upsert_node(&self, node: NodeInfo) {
        debug!(node = %node.name, "Registering node");
        self.nodes.insert(node.name.clone(), node);
    }

    pub fn remove_node(&self, name: &str) -> Option<NodeInfo> {
        debug!(node = %name, "Unregistering node");
        self.nodes.remove(name).map(|(_, v)| v)
    }

    /// Insert or update a pod
    pub fn upsert_pod(&self, pod: PodInfo) {
        debug!(namespace = %pod.namespace, pod = %pod.name, "Registering pod");
        self.pods
            .insert((pod.namespace.clone(), pod.name.clone()), pod);
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) -> Option<PodInfo> {
        debug!(namespace = %namespace, pod = %name, "Unregistering pod");
        self.pods
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|(_, v)| v)
    }

    /// Make the registry contain exactly the given nodes and pods
    pub fn sync(&self, nodes: Vec<NodeInfo>, pods: Vec<PodInfo>) {
        let node_names: HashSet<String> = nodes.iter().map(|n| n.name.clone()).collect();
        let pod_keys: HashSet<PodKey> = pods
            .iter()
            .map(|p| (p.namespace.clone(), p.name.clone()))
            .collect();

        for node in nodes {
            self.upsert_node(node);
        }
        for pod in pods {
            self.upsert_pod(pod);
        }

        self.nodes.retain(|name, _| node_names.contains(name));
        self.pods.retain(|key, _| pod_keys.contains(key));
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn pod_count(&self) -> usize {
        self.pods.len()
    }
}

impl NodeRegistry for ClusterRegistry {
    fn list_nodes(&self) -> Vec<NodeInfo> {
        let mut nodes: Vec<NodeInfo> = self.nodes.iter().map(|r| r.value().clone()).collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    fn get_node(&self, name: &str) -> Option<NodeInfo> {
        self.nodes.get(name).map(|r| r.clone())
    }

    fn list_pods(&self) -> Vec<PodInfo> {
        let mut pods: Vec<PodInfo> = self.pods.iter().map(|r| r.value().clone()).collect();
        pods.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        pods
    }

    fn get_pod(&self, namespace: &str, name: &str) -> Option<PodInfo> {
        self.pods
            .get(&(namespace.to_string(), name.to_string()))
            .map(|r| r.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Labels;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_nodes_listed_in_name_order() {
        let registry = ClusterRegistry::new();
        registry.upsert_node(NodeInfo::new("node-c", Labels::new()));
        registry.upsert_node(NodeInfo::new("node-a", Labels::new()));
        registry.upsert_node(NodeInfo::new("node-b", Labels::new()));

        let names: Vec<String> = registry.list_nodes().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["node-a", "node-b", "node-c"]);
    }

    #[test]
    fn test_upsert_replaces_labels() {
        let registry = ClusterRegistry::new();
        registry.upsert_node(NodeInfo::new("node-a", labels(&[("zone", "a")])));
        registry.upsert_node(NodeInfo::new("node-a", labels(&[("zone", "b")])));

        assert_eq!(registry.node_count(), 1);
        assert_eq!(registry.get_node("node-a").unwrap().labels["zone"], "b");
    }

    #[test]
    fn test_pods_ordered_by_namespace_then_name() {
        let registry = ClusterRegistry::new();
        registry.upsert_pod(PodInfo::new("kube-system", "dns", Labels::new()));
        registry.upsert_pod(PodInfo::new("default", "web-1", Labels::new()));
        registry.upsert_pod(PodInfo::new("default", "web-0", Labels::new()));

        let keys: Vec<(String, String)> = registry
            .list_pods()
            .into_iter()
            .map(|p| (p.namespace, p.name))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("default".to_string(), "web-0".to_string()),
                ("default".to_string(), "web-1".to_string()),
                ("kube-system".to_string(), "dns".to_string()),
            ]
        );
        assert!(registry.get_pod("default", "web-0").is_some());
        assert!(registry.get_pod("kube-system", "web-0").is_none());
    }

    #[test]
    fn test_sync_removes_missing_objects() {
        let registry = ClusterRegistry::new();
        registry.upsert_node(NodeInfo::new("old-node", Labels::new()));
        registry.upsert_pod(PodInfo::new("default", "old-pod", Labels::new()));

        registry.sync(
            vec![NodeInfo::new("new-node", Labels::new())],
            vec![PodInfo::new("default", "new-pod", Labels::new())],
        );

        assert!(registry.get_node("old-node").is_none());
        assert!(registry.get_node("new-node").is_some());
        assert!(registry.get_pod("default", "old-pod").is_none());
        assert_eq!(registry.pod_count(), 1);
    }

    #[test]
    fn test_remove() {
        let registry = ClusterRegistry::new();
        registry.upsert_node(NodeInfo::new("node-a", Labels::new()));
        registry.upsert_pod(PodInfo::new("default", "web-0", Labels::new()));

        assert!(registry.remove_node("node-a").is_some());
        assert!(registry.remove_pod("default", "web-0").is_some());
        assert_eq!(registry.node_count(), 0);
        assert_eq!(registry.pod_count(), 0);
    }
}
