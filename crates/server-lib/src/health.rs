//! Health check infrastructure for the metrics server
//!
//! Tracks component health for liveness and readiness probes. The scrape
//! driver reports every cycle; the server marks itself ready once the first
//! snapshot has been published.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is experiencing issues but still operational
    Degraded,
    /// Component has failed
    Unhealthy,
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across all components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|c| c.status)
            .max_by_key(|s| match s {
                ComponentStatus::Healthy => 0,
                ComponentStatus::Degraded => 1,
                ComponentStatus::Unhealthy => 2,
            })
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const SCRAPER: &str = "scraper";
    pub const REGISTRY: &str = "registry";
}

/// Health registry for tracking component health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    /// Update scraper health from one cycle's node counts.
    ///
    /// `kept_previous` marks a cycle where every node failed and the previous
    /// snapshot is still served. That counts as degraded, not unhealthy.
    pub async fn record_cycle(&self, total_nodes: usize, failed_nodes: usize, kept_previous: bool) {
        let health = if failed_nodes == 0 {
            ComponentHealth::healthy()
        } else if failed_nodes >= total_nodes && kept_previous {
            ComponentHealth::degraded(format!(
                "all {} node scrapes failed, serving stale snapshot",
                total_nodes
            ))
        } else if failed_nodes >= total_nodes {
            ComponentHealth::unhealthy(format!("all {} node scrapes failed", total_nodes))
        } else {
            ComponentHealth::degraded(format!(
                "{} of {} node scrapes failed",
                failed_nodes, total_nodes
            ))
        };
        self.update(components::SCRAPER, health).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let components = self.components.read().await;

        let mut unhealthy: Vec<_> = components
            .iter()
            .filter(|(_, c)| c.status == ComponentStatus::Unhealthy)
            .collect();
        unhealthy.sort_by(|a, b| a.0.cmp(b.0));

        let reason = if !ready {
            Some("No snapshot published yet".to_string())
        } else if let Some((name, c)) = unhealthy.first() {
            Some(match &c.message {
                Some(message) => format!("{} unhealthy: {}", name, message),
                None => format!("{} unhealthy", name),
            })
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_registry_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_record_cycle_statuses() {
        let registry = HealthRegistry::new();
        registry.register(components::SCRAPER).await;

        registry.record_cycle(3, 0, false).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);

        registry.record_cycle(3, 1, false).await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::SCRAPER].message.as_deref(),
            Some("1 of 3 node scrapes failed")
        );

        registry.record_cycle(3, 3, false).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_stale_snapshot_keeps_server_ready() {
        let registry = HealthRegistry::new();
        registry.register(components::SCRAPER).await;
        registry.set_ready(true).await;

        registry.record_cycle(3, 3, true).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::SCRAPER].message.as_deref(),
            Some("all 3 node scrapes failed, serving stale snapshot")
        );
        let readiness = registry.readiness().await;
        assert!(readiness.ready);
        assert!(readiness.reason.is_none());
    }

    #[tokio::test]
    async fn test_worst_component_wins() {
        let registry = HealthRegistry::new();
        registry.register(components::REGISTRY).await;
        registry
            .update(components::SCRAPER, ComponentHealth::degraded("slow"))
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_readiness_not_ready_initially() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[tokio::test]
    async fn test_readiness_not_ready_when_nothing_is_served() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry.record_cycle(2, 2, false).await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("scraper unhealthy: all 2 node scrapes failed")
        );
    }
}
