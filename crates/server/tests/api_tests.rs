//! Integration tests for the metrics server HTTP API

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use metrics_server::api::{create_router, AppState, StatusBody, API_PREFIX};
use server_lib::{
    api::{NodeMetrics, NodeMetricsList, PodMetrics, PodMetricsList, Table},
    health::{components, ComponentStatus, HealthRegistry},
    models::{ContainerMetric, Labels, NodeInfo, NodeMetric, PodInfo, PodMetric, SampleWindow},
    observability::FreshnessHistogram,
    quantity::{sum_resources, ResourceList},
    registry::ClusterRegistry,
    store::{MetricsStore, Snapshot},
};
use server_lib::api::{NodeMetricsResource, PodMetricsResource};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn usage(cpu: &str, memory: &str) -> ResourceList {
    [
        ("cpu".to_string(), cpu.parse().unwrap()),
        ("memory".to_string(), memory.parse().unwrap()),
    ]
    .into()
}

fn seed() -> (Arc<MetricsStore>, Arc<ClusterRegistry>) {
    let now = Utc::now();
    let registry = Arc::new(ClusterRegistry::new());

    let samples = [
        ("node-a", "zone-1", "1500m", "4Gi"),
        ("node-b", "zone-2", "250m", "1Gi"),
    ];
    let nodes: Vec<NodeMetric> = samples
        .iter()
        .map(|(name, zone, cpu, memory)| {
            let node_labels = labels(&[("zone", *zone)]);
            registry.upsert_node(NodeInfo::new(*name, node_labels.clone()));
            NodeMetric {
                name: name.to_string(),
                labels: node_labels,
                window: SampleWindow::new(now, Duration::from_secs(10)),
                resources: usage(cpu, memory),
            }
        })
        .collect();

    let pod_labels = labels(&[("app", "web")]);
    registry.upsert_pod(PodInfo::new("default", "web-0", pod_labels.clone()));
    let containers = vec![ContainerMetric {
        name: "web".to_string(),
        resources: usage("100m", "64Mi"),
    }];
    let pods = vec![PodMetric {
        namespace: "default".to_string(),
        name: "web-0".to_string(),
        labels: pod_labels,
        window: SampleWindow::new(now, Duration::from_secs(15)),
        aggregate: sum_resources(containers.iter().map(|c| &c.resources)),
        containers,
    }];

    let store = Arc::new(MetricsStore::new());
    store.replace(Snapshot::new(nodes, pods, now));
    (store, registry)
}

async fn setup_test_app(ready: bool) -> Router {
    let (store, registry) = seed();
    let freshness = FreshnessHistogram::new();

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SCRAPER).await;
    health_registry.register(components::REGISTRY).await;
    health_registry.set_ready(ready).await;

    let state = Arc::new(AppState::new(
        health_registry,
        NodeMetricsResource::new(store.clone(), registry.clone()).with_freshness(freshness.clone()),
        PodMetricsResource::new(store, registry).with_freshness(freshness),
        CancellationToken::new(),
    ));
    create_router(state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_list_nodes() {
    let app = setup_test_app(true).await;

    let (status, body) = get(app, &format!("{}/nodes", API_PREFIX)).await;

    assert_eq!(status, StatusCode::OK);
    let list: NodeMetricsList = serde_json::from_slice(&body).unwrap();
    assert_eq!(list.kind, "NodeMetricsList");
    let names: Vec<&str> = list.items.iter().map(|n| n.metadata.name.as_str()).collect();
    assert_eq!(names, vec!["node-a", "node-b"]);
    assert_eq!(list.items[0].usage["cpu"].to_string(), "1500m");
}

#[tokio::test]
async fn test_list_nodes_with_label_selector() {
    let app = setup_test_app(true).await;

    let (status, body) = get(app, &format!("{}/nodes?labelSelector=zone%3Dzone-2", API_PREFIX)).await;

    assert_eq!(status, StatusCode::OK);
    let list: NodeMetricsList = serde_json::from_slice(&body).unwrap();
    assert_eq!(list.items.len(), 1);
    assert_eq!(list.items[0].metadata.name, "node-b");
}

#[tokio::test]
async fn test_invalid_selector_is_bad_request() {
    let app = setup_test_app(true).await;

    let (status, body) = get(app, &format!("{}/nodes?labelSelector=zone%20in%20(a", API_PREFIX)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let status_body: StatusBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(status_body.reason, "BadRequest");
    assert_eq!(status_body.code, 400);
}

#[tokio::test]
async fn test_get_node() {
    let app = setup_test_app(true).await;

    let (status, body) = get(app, &format!("{}/nodes/node-a", API_PREFIX)).await;

    assert_eq!(status, StatusCode::OK);
    let node: NodeMetrics = serde_json::from_slice(&body).unwrap();
    assert_eq!(node.metadata.labels, labels(&[("zone", "zone-1")]));
    assert_eq!(node.window, Duration::from_secs(10));
}

#[tokio::test]
async fn test_get_missing_node_is_not_found() {
    let app = setup_test_app(true).await;

    let (status, body) = get(app, &format!("{}/nodes/node-z", API_PREFIX)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let status_body: StatusBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(status_body.kind, "Status");
    assert_eq!(status_body.reason, "NotFound");
    assert!(status_body.message.contains("node-z"));
}

#[tokio::test]
async fn test_nodes_as_table_via_accept_header() {
    let app = setup_test_app(true).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("{}/nodes", API_PREFIX))
                .header(
                    header::ACCEPT,
                    "application/json;as=Table;v=v1;g=meta.k8s.io, application/json",
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let table: Table = serde_json::from_slice(&body).unwrap();
    assert_eq!(table.column_names(), vec!["Name", "cpu", "memory", "Window"]);
    assert_eq!(table.rows[0].cells, vec!["node-a", "1500m", "4Gi", "10s"]);
    assert_eq!(table.rows[1].cells, vec!["node-b", "250m", "1Gi", "10s"]);
}

#[tokio::test]
async fn test_pods_as_table_via_query_without_headers() {
    let app = setup_test_app(true).await;

    let (status, body) = get(
        app,
        &format!("{}/namespaces/default/pods?as=Table&noHeaders=true", API_PREFIX),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let table: Table = serde_json::from_slice(&body).unwrap();
    assert!(table.column_definitions.is_empty());
    assert_eq!(table.rows[0].cells, vec!["web-0", "100m", "64Mi", "15s"]);
}

#[tokio::test]
async fn test_list_pods_across_and_within_namespaces() {
    let app = setup_test_app(true).await;

    let (status, body) = get(app.clone(), &format!("{}/pods", API_PREFIX)).await;
    assert_eq!(status, StatusCode::OK);
    let all: PodMetricsList = serde_json::from_slice(&body).unwrap();
    assert_eq!(all.items.len(), 1);

    let (status, body) = get(app, &format!("{}/namespaces/kube-system/pods", API_PREFIX)).await;
    assert_eq!(status, StatusCode::OK);
    let scoped: PodMetricsList = serde_json::from_slice(&body).unwrap();
    assert!(scoped.items.is_empty());
}

#[tokio::test]
async fn test_get_pod() {
    let app = setup_test_app(true).await;

    let (status, body) = get(app.clone(), &format!("{}/namespaces/default/pods/web-0", API_PREFIX)).await;
    assert_eq!(status, StatusCode::OK);
    let pod: PodMetrics = serde_json::from_slice(&body).unwrap();
    assert_eq!(pod.metadata.namespace.as_deref(), Some("default"));
    assert_eq!(pod.containers[0].name, "web");

    let (status, _) = get(app, &format!("{}/namespaces/other/pods/web-0", API_PREFIX)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_healthz_endpoint() {
    let app = setup_test_app(true).await;

    let (status, body) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert!(health["components"].get(components::SCRAPER).is_some());
}

#[tokio::test]
async fn test_probes_pass_while_serving_stale_snapshot() {
    let (store, registry) = seed();
    let health_registry = HealthRegistry::new();
    health_registry.set_ready(true).await;
    health_registry.record_cycle(2, 2, true).await;
    assert_eq!(health_registry.health().await.status, ComponentStatus::Degraded);

    let state = Arc::new(AppState::new(
        health_registry,
        NodeMetricsResource::new(store.clone(), registry.clone()).with_freshness(FreshnessHistogram::new()),
        PodMetricsResource::new(store, registry).with_freshness(FreshnessHistogram::new()),
        CancellationToken::new(),
    ));
    let app = create_router(state);

    let (status, _) = get(app.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(app, &format!("{}/nodes", API_PREFIX)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_healthz_unhealthy_when_nothing_is_served() {
    let (store, registry) = seed();
    let health_registry = HealthRegistry::new();
    health_registry.record_cycle(2, 2, false).await;
    assert_eq!(health_registry.health().await.status, ComponentStatus::Unhealthy);

    let state = Arc::new(AppState::new(
        health_registry,
        NodeMetricsResource::new(store.clone(), registry.clone()).with_freshness(FreshnessHistogram::new()),
        PodMetricsResource::new(store, registry).with_freshness(FreshnessHistogram::new()),
        CancellationToken::new(),
    ));
    let app = create_router(state);

    let (status, _) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_readyz_before_first_snapshot() {
    let app = setup_test_app(false).await;

    let (status, body) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_when_ready() {
    let app = setup_test_app(true).await;

    let (status, _) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup_test_app(true).await;
    server_lib::observability::ServerMetrics::new().inc_cycle_overrun();

    let (status, body) = get(app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("metrics_server_cycle_overruns_total"));
}

#[tokio::test]
async fn test_cancelled_server_rejects_requests() {
    let (store, registry) = seed();
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::new(
        HealthRegistry::new(),
        NodeMetricsResource::new(store.clone(), registry.clone()).with_freshness(FreshnessHistogram::new()),
        PodMetricsResource::new(store, registry).with_freshness(FreshnessHistogram::new()),
        shutdown.clone(),
    ));
    shutdown.cancel();

    let (status, _) = get(create_router(state), &format!("{}/nodes", API_PREFIX)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
