use super::table::{build_table, TableEntry};
use super::{
    ApiError, ApiResult, ListOptions, MetricsObject, MetricsResource, NodeMetrics,
    NodeMetricsList, ObjectFields, RequestContext, Table, TableOptions,
};
use crate::clock::{Clock, SystemClock};
use crate::models::{Labels, NodeMetric};
use crate::observability::FreshnessHistogram;
use crate::registry::NodeRegistry;
use crate::store::MetricsStore;
use std::sync::Arc;

const RESOURCE: &str = "nodes";
const KIND: &str = "nodes.metrics.k8s.io";

/// Node usage served from the current snapshot
#[derive(Clone)]
pub struct NodeMetricsResource {
    store: Arc<MetricsStore>,
    registry: Arc<dyn NodeRegistry>,
    clock: Arc<dyn Clock>,
    freshness: FreshnessHistogram,
}

impl NodeMetricsResource {
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

    /// Live registry labels, or the snapshot copy if the node has left
    fn labels(&self, metric: &NodeMetric) -> Labels {
        self.registry
            .get_node(&metric.name)
            .map(|node| node.labels)
            .unwrap_or_else(|| metric.labels.clone())
    }
}

impl MetricsResource for NodeMetricsResource {
    type Item = NodeMetrics;
    type List = NodeMetricsList;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn get(&self, ctx: &RequestContext, name: &str) -> ApiResult<NodeMetrics> {
        ctx.check()?;

        let snapshot = self.store.read();
        let metric = snapshot
            .node(name)
            .ok_or_else(|| ApiError::not_found(KIND, name))?;

        let now = self.clock.now();
        self.freshness.observe(RESOURCE, now, metric.window.timestamp);
        Ok(NodeMetrics::from_metric(metric, self.labels(metric), now))
    }

    fn list(&self, ctx: &RequestContext, options: &ListOptions) -> ApiResult<NodeMetricsList> {
        ctx.check()?;

        let snapshot = self.store.read();
        let now = self.clock.now();
        let mut items = Vec::new();

        for (i, metric) in snapshot.nodes().iter().enumerate() {
            ctx.check_at(i)?;

            let fields = ObjectFields {
                name: &metric.name,
                namespace: "",
            };
            let labels = self.labels(metric);
            if options.matches(&fields, &labels) {
                items.push(NodeMetrics::from_metric(metric, labels, now));
            }
        }

        for item in &items {
            self.freshness.observe(RESOURCE, now, item.timestamp);
        }
        Ok(NodeMetricsList::new(items))
    }

    fn convert_to_table(
        &self,
        ctx: &RequestContext,
        object: &MetricsObject,
        options: &TableOptions,
    ) -> ApiResult<Table> {
        ctx.check()?;

        let items = match object {
            MetricsObject::Node(node) => std::slice::from_ref(node),
            MetricsObject::NodeList(list) => list.items.as_slice(),
            _ => {
                return Err(ApiError::BadRequest(
                    "expected NodeMetrics or NodeMetricsList".to_string(),
                ))
            }
        };

        let entries: Vec<TableEntry<'_>> = items
            .iter()
            .map(|node| TableEntry {
                name: &node.metadata.name,
                resources: node.usage.clone(),
                window: node.window,
            })
            .collect();

        Ok(build_table(&entries, options))
    }
}
