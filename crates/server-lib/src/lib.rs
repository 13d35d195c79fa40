//! Core library for the cluster metrics server
//!
//! This crate provides:
//! - Exact resource quantities and the snapshot data model
//! - The node/pod registry and its inventory file watcher
//! - Bounded, partial-failure tolerant scraping of node agents
//! - The atomically swapped metrics store
//! - The Get/List/Table query layer with label and field selectors
//! - Health checks and observability

pub mod api;
pub mod clock;
pub mod health;
pub mod models;
pub mod observability;
pub mod quantity;
pub mod registry;
pub mod scrape;
pub mod store;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EventLogger, FreshnessHistogram, ServerMetrics};
pub use quantity::{Quantity, ResourceList};
pub use store::{MetricsStore, Snapshot};
