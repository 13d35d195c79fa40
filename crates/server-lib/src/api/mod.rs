//! Query layer over the metrics store
//!
//! Node and pod resources answer Get, List and ConvertToTable against the
//! snapshot that is current when the request starts. Labels come from the
//! live registry so relabeling shows up before the next scrape. Every item
//! served is recorded in the freshness histogram.

mod error;
mod node;
mod pod;
mod selector;
mod table;
mod types;


pub use error::{ApiError, ApiResult};
pub use node::NodeMetricsResource;
pub use pod::PodMetricsResource;
pub use selector::{
    FieldRequirement, FieldSelector, LabelRequirement, LabelSelector, ObjectFields,
    SelectorParseError,
};
pub use table::{Table, TableColumn, TableOptions, TableRow, TABLE_API_VERSION};
pub use types::{
    ContainerMetrics, NodeMetrics, NodeMetricsList, ObjectMeta, PodMetrics, PodMetricsList,
    API_VERSION,
};

use crate::models::Labels;
use tokio_util::sync::CancellationToken;

/// Entries processed between cancellation checks
const CANCEL_CHECK_EVERY: usize = 256;

/// Per-request context handed in by the HTTP layer
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    namespace: Option<String>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Namespace the request is scoped to; `None` means all namespaces
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn check(&self) -> ApiResult<()> {
        if self.cancel.is_cancelled() {
            Err(ApiError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Check cancellation periodically while walking `index` entries
    pub(crate) fn check_at(&self, index: usize) -> ApiResult<()> {
        if index % CANCEL_CHECK_EVERY == 0 {
            self.check()
        } else {
            Ok(())
        }
    }
}

/// Filters for a List request; absent selectors match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub field_selector: Option<FieldSelector>,
    pub label_selector: Option<LabelSelector>,
}

impl ListOptions {
    /// Build options from raw query parameters
    pub fn parse(field_selector: Option<&str>, label_selector: Option<&str>) -> ApiResult<Self> {
        Ok(Self {
            field_selector: field_selector
                .map(str::parse::<FieldSelector>)
                .transpose()?,
            label_selector: label_selector
                .map(str::parse::<LabelSelector>)
                .transpose()?,
        })
    }

    pub fn with_field_selector(mut self, selector: FieldSelector) -> Self {
        self.field_selector = Some(selector);
        self
    }

    pub fn with_label_selector(mut self, selector: LabelSelector) -> Self {
        self.label_selector = Some(selector);
        self
    }

    pub fn matches(&self, fields: &ObjectFields<'_>, labels: &Labels) -> bool {
        self.field_selector
            .as_ref()
            .map_or(true, |s| s.matches(fields))
            && self.label_selector.as_ref().map_or(true, |s| s.matches(labels))
    }
}

/// A Get or List result, as passed to ConvertToTable
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsObject {
    Node(NodeMetrics),
    NodeList(NodeMetricsList),
    Pod(PodMetrics),
    PodList(PodMetricsList),
}

impl From<NodeMetrics> for MetricsObject {
    fn from(value: NodeMetrics) -> Self {
        MetricsObject::Node(value)
    }
}

impl From<NodeMetricsList> for MetricsObject {
    fn from(value: NodeMetricsList) -> Self {
        MetricsObject::NodeList(value)
    }
}

impl From<PodMetrics> for MetricsObject {
    fn from(value: PodMetrics) -> Self {
        MetricsObject::Pod(value)
    }
}

impl From<PodMetricsList> for MetricsObject {
    fn from(value: PodMetricsList) -> Self {
        MetricsObject::PodList(value)
    }
}

/// Read-only resource backed by the metrics store
pub trait MetricsResource: Send + Sync {
    type Item: Into<MetricsObject>;
    type List: Into<MetricsObject>;

    /// Resource name used in errors, e.g. `nodes.metrics.k8s.io`
    fn kind(&self) -> &'static str;

    fn get(&self, ctx: &RequestContext, name: &str) -> ApiResult<Self::Item>;

    fn list(&self, ctx: &RequestContext, options: &ListOptions) -> ApiResult<Self::List>;

    fn convert_to_table(
        &self,
        ctx: &RequestContext,
        object: &MetricsObject,
        options: &TableOptions,
    ) -> ApiResult<Table>;
}
