use super::table::{build_table, TableEntry};
use super::{
    ApiError, ApiResult, ListOptions, MetricsObject, MetricsResource, ObjectFields, PodMetrics,
    PodMetricsList, RequestContext, Table, TableOptions,
};
use crate::clock::{Clock, SystemClock};
use crate::models::{Labels, PodMetric};
use crate::observability::FreshnessHistogram;
use crate::registry::NodeRegistry;
use crate::store::MetricsStore;
use std::sync::Arc;

const RESOURCE: &str = "pods";
const KIND: &str = "pods.metrics.k8s.io";

/// Pod usage served from the current snapshot
///
/// Get needs a namespace in the request context. List is scoped to the
/// context namespace when there is one and spans all namespaces otherwise.
#[derive(Clone)]
pub struct PodMetricsResource {
    store: Arc<MetricsStore>,
    registry: Arc<dyn NodeRegistry>,
    clock: Arc<dyn Clock>,
    freshness: FreshnessHistogram,
}

impl PodMetricsResource {
    pub fn new(store: Arc<MetricsStore>, registry: Arc<dyn NodeRegistry>) -> Self {
        Self {
            store,
            registry,
            clock: Arc::new(SystemClock),
            freshness: FreshnessHistogram::global(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_freshness(mut self, freshness: FreshnessHistogram) -> Self {
        self.freshness = freshness;
        self
    }

    fn labels(&self, metric: &PodMetric) -> Labels {
        self.registry
            .get_pod(&metric.namespace, &metric.name)
            .map(|pod| pod.labels)
            .unwrap_or_else(|| metric.labels.clone())
    }
}

impl MetricsResource for PodMetricsResource {
    type Item = PodMetrics;
    type List = PodMetricsList;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn get(&self, ctx: &RequestContext, name: &str) -> ApiResult<PodMetrics> {
        ctx.check()?;
        let namespace = ctx
            .namespace()
            .ok_or_else(|| ApiError::BadRequest("namespace is required for pods".to_string()))?;

        let snapshot = self.store.read();
        let metric = snapshot
            .pod(namespace, name)
            .ok_or_else(|| ApiError::namespaced_not_found(KIND, namespace, name))?;

        let now = self.clock.now();
        self.freshness.observe(RESOURCE, now, metric.window.timestamp);
        Ok(PodMetrics::from_metric(metric, self.labels(metric), now))
    }

    fn list(&self, ctx: &RequestContext, options: &ListOptions) -> ApiResult<PodMetricsList> {
        ctx.check()?;

        let snapshot = self.store.read();
        let now = self.clock.now();
        let scope = ctx.namespace();
        let mut items = Vec::new();

        let in_scope = snapshot
            .pods()
            .iter()
            .filter(|pod| scope.map_or(true, |ns| pod.namespace == ns));

        for (i, metric) in in_scope.enumerate() {
            ctx.check_at(i)?;

            let fields = ObjectFields {
                name: &metric.name,
                namespace: &metric.namespace,
            };
            let labels = self.labels(metric);
            if options.matches(&fields, &labels) {
                items.push(PodMetrics::from_metric(metric, labels, now));
            }
        }

        for item in &items {
            self.freshness.observe(RESOURCE, now, item.timestamp);
        }
        Ok(PodMetricsList::new(items))
    }

    fn convert_to_table(
        &self,
        ctx: &RequestContext,
        object: &MetricsObject,
        options: &TableOptions,
    ) -> ApiResult<Table> {
        ctx.check()?;

        let items = match object {
            MetricsObject::Pod(pod) => std::slice::from_ref(pod),
            MetricsObject::PodList(list) => list.items.as_slice(),
            _ => {
                return Err(ApiError::BadRequest(
                    "expected PodMetrics or PodMetricsList".to_string(),
                ))
            }
        };

        let entries: Vec<TableEntry<'_>> = items
            .iter()
            .map(|pod| TableEntry {
                name: &pod.metadata.name,
                resources: pod.total_usage(),
                window: pod.window,
            })
            .collect();

        Ok(build_table(&entries, options))
    }
}
