//! Snapshot storage shared between the scrape driver and the query layer
//!
//! The driver is the only writer; it builds a complete [`Snapshot`] and swaps
//! it in. Readers take an `Arc` to whichever snapshot is current and keep
//! using it for the whole request, so they never see two cycles mixed.

use crate::models::{NodeMetric, PodMetric};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Immutable result of one scrape cycle
#[derive(Debug, Clone)]
pub struct Snapshot {
    nodes: Arc<[NodeMetric]>,
    pods: Arc<[PodMetric]>,
    completed_at: DateTime<Utc>,
    stale: bool,
}

impl Snapshot {
    pub fn new(nodes: Vec<NodeMetric>, pods: Vec<PodMetric>, completed_at: DateTime<Utc>) -> Self {
        Self {
            nodes: nodes.into(),
            pods: pods.into(),
            completed_at,
            stale: false,
        }
    }

    pub fn empty(completed_at: DateTime<Utc>) -> Self {
        Self::new(Vec::new(), Vec::new(), completed_at)
    }

    /// Same data, flagged as left over from an earlier cycle
    pub fn mark_stale(&self) -> Self {
        Self {
            nodes: Arc::clone(&self.nodes),
            pods: Arc::clone(&self.pods),
            completed_at: self.completed_at,
            stale: true,
        }
    }

    pub fn nodes(&self) -> &[NodeMetric] {
        &self.nodes
    }

    pub fn pods(&self) -> &[PodMetric] {
        &self.pods
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// True when every scrape of the latest cycle failed and this data is older
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn has_data(&self) -> bool {
        !self.nodes.is_empty() || !self.pods.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&NodeMetric> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<&PodMetric> {
        self.pods
            .iter()
            .find(|p| p.namespace == namespace && p.name == name)
    }
}

/// Single-writer, many-reader slot holding the current snapshot
#[derive(Debug)]
pub struct MetricsStore {
    current: ArcSwap<Snapshot>,
    initialized: AtomicBool,
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::empty(DateTime::<Utc>::UNIX_EPOCH)),
            initialized: AtomicBool::new(false),
        }
    }

    /// Current snapshot; never blocks on the writer
    pub fn read(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Publish a new snapshot
    pub fn replace(&self, snapshot: Snapshot) {
        self.current.store(Arc::new(snapshot));
        self.initialized.store(true, Ordering::Release);
    }

    /// Whether any cycle has published yet
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Labels, SampleWindow};
    use crate::quantity::{Quantity, ResourceList, RESOURCE_CPU};
    use proptest::prelude::*;
    use std::time::Duration;

    fn node(name: &str, generation: i64) -> NodeMetric {
        let resources: ResourceList =
            [(RESOURCE_CPU.to_string(), Quantity::from_milli(generation))].into();
        NodeMetric {
            name: name.to_string(),
            labels: Labels::new(),
            window: SampleWindow::new(DateTime::<Utc>::UNIX_EPOCH, Duration::from_secs(10)),
            resources,
        }
    }

    fn generation_snapshot(generation: i64, size: usize) -> Snapshot {
        let nodes = (0..size)
            .map(|i| node(&format!("node-{}", i), generation))
            .collect();
        Snapshot::new(nodes, Vec::new(), Utc::now())
    }

    #[test]
    fn test_store_starts_empty_and_uninitialized() {
        let store = MetricsStore::new();
        let snapshot = store.read();
        assert!(!snapshot.has_data());
        assert!(!store.is_initialized());
    }

    #[test]
    fn test_replace_is_visible_to_later_reads() {
        let store = MetricsStore::new();
        store.replace(generation_snapshot(1, 3));

        let snapshot = store.read();
        assert!(store.is_initialized());
        assert_eq!(snapshot.nodes().len(), 3);
        assert!(snapshot.node("node-1").is_some());
        assert!(snapshot.node("node-9").is_none());
    }

    #[test]
    fn test_reader_keeps_its_snapshot_across_replace() {
        let store = MetricsStore::new();
        store.replace(generation_snapshot(1, 2));

        let held = store.read();
        store.replace(generation_snapshot(2, 5));

        assert_eq!(held.nodes().len(), 2);
        assert_eq!(store.read().nodes().len(), 5);
    }

    #[test]
    fn test_mark_stale_shares_data() {
        let snapshot = generation_snapshot(1, 2);
        let stale = snapshot.mark_stale();

        assert!(stale.is_stale());
        assert!(!snapshot.is_stale());
        assert_eq!(stale.nodes(), snapshot.nodes());
        assert_eq!(stale.completed_at(), snapshot.completed_at());
    }

    fn assert_single_generation(snapshot: &Snapshot) {
        let Some(first) = snapshot.nodes().first() else {
            return;
        };
        let generation = first.resources[RESOURCE_CPU];
        for node in snapshot.nodes() {
            assert_eq!(node.resources[RESOURCE_CPU], generation);
        }
        assert_eq!(snapshot.nodes().len() as i128, generation.milli_value());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_concurrent_reads_never_mix_generations(
            sizes in proptest::collection::vec(1usize..20, 1..30),
            readers in 1usize..6,
        ) {
            let store = Arc::new(MetricsStore::new());

            std::thread::scope(|scope| {
                for _ in 0..readers {
                    let store = Arc::clone(&store);
                    scope.spawn(move || {
                        for _ in 0..200 {
                            assert_single_generation(&store.read());
                        }
                    });
                }

                for size in &sizes {
                    // Generation number doubles as the node count.
                    store.replace(generation_snapshot(*size as i64, *size));
                }
            });

            let last = *sizes.last().unwrap();
            prop_assert_eq!(store.read().nodes().len(), last);
        }
    }
}
