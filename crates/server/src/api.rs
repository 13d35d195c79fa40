//! HTTP API: resource metrics, health checks and Prometheus metrics

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use server_lib::{
    api::{
        ApiError, ListOptions, MetricsObject, MetricsResource, NodeMetricsResource,
        PodMetricsResource, RequestContext, TableOptions,
    },
    health::{ComponentStatus, HealthRegistry},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Prefix of the resource metrics routes
pub const API_PREFIX: &str = "/apis/metrics.k8s.io/v1beta1";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub nodes: NodeMetricsResource,
    pub pods: PodMetricsResource,
    /// Cancelled on shutdown; every request gets a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        nodes: NodeMetricsResource,
        pods: PodMetricsResource,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            health_registry,
            nodes,
            pods,
            shutdown,
        }
    }

    fn context(&self) -> RequestContext {
        RequestContext::new().with_cancellation(self.shutdown.child_token())
    }
}

/// Query parameters accepted by the resource routes
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuery {
    pub field_selector: Option<String>,
    pub label_selector: Option<String>,
    #[serde(rename = "as")]
    pub render_as: Option<String>,
    #[serde(default)]
    pub no_headers: bool,
}

impl ResourceQuery {
    fn list_options(&self) -> Result<ListOptions, ApiError> {
        ListOptions::parse(
            self.field_selector.as_deref(),
            self.label_selector.as_deref(),
        )
    }

    /// Table form is requested by `?as=Table` or an `Accept` header with `as=Table`
    fn table_options(&self, headers: &HeaderMap) -> Option<TableOptions> {
        let accept_table = headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.split(';').any(|param| param.trim() == "as=Table"));
        let query_table = self.render_as.as_deref() == Some("Table");

        (accept_table || query_table).then_some(TableOptions {
            no_headers: self.no_headers,
        })
    }
}

/// `Status`-shaped error body
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub kind: String,
    pub api_version: String,
    pub status: String,
    pub message: String,
    pub reason: String,
    pub code: u16,
}

struct ApiFailure(ApiError);

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let code = self.0.status_code();
        let body = StatusBody {
            kind: "Status".to_string(),
            api_version: "v1".to_string(),
            status: "Failure".to_string(),
            message: self.0.to_string(),
            reason: self.0.reason().to_string(),
            code,
        };
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        debug!(code, error = %self.0, "Request failed");

        (status, Json(body)).into_response()
    }
}

/// Serialize a result as JSON or convert it to a table first
fn render<R, T>(
    resource: &R,
    ctx: &RequestContext,
    result: Result<T, ApiError>,
    table: Option<TableOptions>,
) -> Response
where
    R: MetricsResource,
    T: Into<MetricsObject> + Serialize,
{
    let object = match result {
        Ok(object) => object,
        Err(e) => return ApiFailure(e).into_response(),
    };

    match table {
        None => Json(object).into_response(),
        Some(options) => match resource.convert_to_table(ctx, &object.into(), &options) {
            Ok(table) => Json(table).into_response(),
            Err(e) => ApiFailure(e).into_response(),
        },
    }
}

async fn list_nodes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResourceQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = state.context();
    let result = query
        .list_options()
        .and_then(|options| state.nodes.list(&ctx, &options));
    render(&state.nodes, &ctx, result, query.table_options(&headers))
}

async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<ResourceQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = state.context();
    let result = state.nodes.get(&ctx, &name);
    render(&state.nodes, &ctx, result, query.table_options(&headers))
}

async fn list_all_pods(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResourceQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = state.context();
    let result = query
        .list_options()
        .and_then(|options| state.pods.list(&ctx, &options));
    render(&state.pods, &ctx, result, query.table_options(&headers))
}

async fn list_namespaced_pods(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
    Query(query): Query<ResourceQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = state.context().with_namespace(namespace);
    let result = query
        .list_options()
        .and_then(|options| state.pods.list(&ctx, &options));
    render(&state.pods, &ctx, result, query.table_options(&headers))
}

async fn get_pod(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    Query(query): Query<ResourceQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = state.context().with_namespace(namespace);
    let result = state.pods.get(&ctx, &name);
    render(&state.pods, &ctx, result, query.table_options(&headers))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still serving partial data
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let resources = Router::new()
        .route("/nodes", get(list_nodes))
        .route("/nodes/:name", get(get_node))
        .route("/pods", get(list_all_pods))
        .route("/namespaces/:namespace/pods", get(list_namespaced_pods))
        .route("/namespaces/:namespace/pods/:name", get(get_pod));

    Router::new()
        .nest(API_PREFIX, resources)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until the state's shutdown token is cancelled
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
