//! Inventory file loading and change watching
//!
//! Watches the inventory file via filesystem notifications and re-syncs the
//! registry whenever it is rewritten.

use super::ClusterRegistry;
use crate::health::{components, ComponentHealth, HealthRegistry};
use crate::models::{NodeInfo, PodInfo};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// On-disk cluster inventory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
    #[serde(default)]
    pub pods: Vec<PodInfo>,
}

impl RegistryFile {
    /// Read and parse an inventory file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read inventory {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse inventory {}", path.display()))
    }

    /// Replace the registry content with this inventory
    pub fn apply(self, registry: &ClusterRegistry) {
        let (nodes, pods) = (self.nodes.len(), self.pods.len());
        registry.sync(self.nodes, self.pods);
        info!(
            event = "registry_reloaded",
            nodes = nodes,
            pods = pods,
            "Cluster inventory applied"
        );
    }
}

/// Reloads the registry whenever the inventory file changes
pub struct RegistryWatcher {
    path: PathBuf,
    registry: Arc<ClusterRegistry>,
    health: Option<HealthRegistry>,
}

impl RegistryWatcher {
    pub fn new(path: impl Into<PathBuf>, registry: Arc<ClusterRegistry>) -> Self {
        Self {
            path: path.into(),
            registry,
            health: None,
        }
    }

    /// Report reload failures against the `registry` health component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Load the inventory once, then start watching for changes.
    /// Watching stops when the returned handle is dropped.
    pub async fn start(self) -> Result<WatcherHandle> {
        RegistryFile::load(&self.path).await?.apply(&self.registry);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create filesystem watcher")?;

        // Editors and config-map mounts replace the file, so watch the directory.
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        info!(path = %self.path.display(), "Watching cluster inventory");

        let path = self.path;
        let registry = self.registry;
        let health = self.health;
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !Self::is_relevant(&event, &path) {
                    continue;
                }
                let status = match RegistryFile::load(&path).await {
                    Ok(file) => {
                        file.apply(&registry);
                        ComponentHealth::healthy()
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to reload cluster inventory");
                        ComponentHealth::degraded(format!("inventory reload failed: {:#}", e))
                    }
                };
                if let Some(health) = &health {
                    health.update(components::REGISTRY, status).await;
                }
            }
            debug!("Inventory watcher channel closed");
        });

        Ok(WatcherHandle {
            _watcher: watcher,
            _task: task,
        })
    }

    fn is_relevant(event: &Event, path: &Path) -> bool {
        let touches_file = event
            .paths
            .iter()
            .any(|p| p.file_name().is_some() && p.file_name() == path.file_name());
        touches_file && matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
    }
}

/// Handle to a running watcher
/// Stops watching when dropped
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    _task: tokio::task::JoinHandle<()>,
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self._task.abort();
    }
}
