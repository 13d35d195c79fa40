//! Metrics Server - cluster resource usage collector
//!
//! Scrapes every known node on a fixed interval, keeps the latest snapshot
//! in memory and serves it through the resource metrics API.

use anyhow::{Context, Result};
use metrics_server::{api, config::ServerConfig};
use server_lib::{
    api::{NodeMetricsResource, PodMetricsResource},
    health::{components, HealthRegistry},
    observability::{EventLogger, FreshnessHistogram},
    registry::{ClusterRegistry, RegistryWatcher},
    scrape::{HttpNodeScraper, ScrapeDriverBuilder, ScrapingSource},
    store::MetricsStore,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = ServerConfig::load()?;
    let logger = EventLogger::new();
    logger.log_startup(SERVER_VERSION, config.scrape_interval());

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SCRAPER).await;
    health_registry.register(components::REGISTRY).await;

    // Cluster inventory
    let registry = Arc::new(ClusterRegistry::new());
    let _watcher = RegistryWatcher::new(&config.registry_path, registry.clone())
        .with_health(health_registry.clone())
        .start()
        .await
        .with_context(|| {
            format!(
                "Failed to load cluster inventory from {}",
                config.registry_path.display()
            )
        })?;

    // Scraping pipeline
    let store = Arc::new(MetricsStore::new());
    let scraper = HttpNodeScraper::new(config.http_scraper_config())?;
    let source = Arc::new(ScrapingSource::new(scraper, config.source_config()));

    let scrape_config = config.scrape_config();
    let driver = ScrapeDriverBuilder::new()
        .source(source)
        .registry(registry.clone())
        .store(store.clone())
        .interval(scrape_config.interval)
        .all_failed_policy(scrape_config.all_failed_policy)
        .health(health_registry.clone())
        .build()?;

    // Serve data as soon as the first round completes
    let report = driver.run_cycle().await;
    if !report.failures.is_empty() {
        warn!(
            failed = report.failures.len(),
            "Initial scrape finished with node failures"
        );
    }
    health_registry.set_ready(true).await;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let driver_handle = tokio::spawn(driver.run(shutdown_rx));

    // Query layer and HTTP surface
    let freshness = FreshnessHistogram::global();
    let nodes = NodeMetricsResource::new(store.clone(), registry.clone())
        .with_freshness(freshness.clone());
    let pods = PodMetricsResource::new(store, registry).with_freshness(freshness);

    let shutdown = CancellationToken::new();
    let app_state = Arc::new(api::AppState::new(
        health_registry,
        nodes,
        pods,
        shutdown.clone(),
    ));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    shutdown.cancel();

    if let Err(e) = driver_handle.await {
        error!(error = %e, "Scrape loop task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
