//! Node selection strategies
//!
//! A picker both chooses one node out of a candidate list and defines the
//! order candidates are sorted in when a check round builds its snapshot.
//! Pickers that always take the first element rely on that pre-sorting.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::node::CheckedNode;

/// Selection strategy shared by every lookup on a cluster
pub trait NodePicker: Send + Sync + 'static {
    /// Choose one candidate; `None` only for an empty slice
    fn pick_node(&self, candidates: &[CheckedNode]) -> Option<CheckedNode>;

    /// Order used to pre-sort candidates after each check round
    fn compare_nodes(&self, a: &CheckedNode, b: &CheckedNode) -> Ordering;
}

/// Uniformly random selection
#[derive(Debug, Default)]
pub struct RandomPicker;

impl NodePicker for RandomPicker {
    fn pick_node(&self, candidates: &[CheckedNode]) -> Option<CheckedNode> {
        if candidates.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..candidates.len());
        candidates.get(index).cloned()
    }

    fn compare_nodes(&self, _a: &CheckedNode, _b: &CheckedNode) -> Ordering {
        Ordering::Equal
    }
}

/// Cycles through candidates sorted by address
#[derive(Debug, Default)]
pub struct RoundRobinPicker {
    index: AtomicUsize,
}

impl RoundRobinPicker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            index: AtomicUsize::new(0),
        }
    }
}

impl NodePicker for RoundRobinPicker {
    fn pick_node(&self, candidates: &[CheckedNode]) -> Option<CheckedNode> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.index.fetch_add(1, AtomicOrdering::AcqRel) % candidates.len();
        candidates.get(index).cloned()
    }

    fn compare_nodes(&self, a: &CheckedNode, b: &CheckedNode) -> Ordering {
        a.addr().cmp(b.addr())
    }
}

/// Always the node with the lowest check latency
#[derive(Debug, Default)]
pub struct LatencyPicker;

impl NodePicker for LatencyPicker {
    fn pick_node(&self, candidates: &[CheckedNode]) -> Option<CheckedNode> {
        candidates.first().cloned()
    }

    fn compare_nodes(&self, a: &CheckedNode, b: &CheckedNode) -> Ordering {
        a.latency().cmp(&b.latency())
    }
}

/// Always the node with the smallest replication lag
///
/// Meant for standby selection. Nodes that did not report a lag sort last.
#[derive(Debug, Default)]
pub struct ReplicationLagPicker;

impl NodePicker for ReplicationLagPicker {
    fn pick_node(&self, candidates: &[CheckedNode]) -> Option<CheckedNode> {
        candidates.first().cloned()
    }

    fn compare_nodes(&self, a: &CheckedNode, b: &CheckedNode) -> Ordering {
        match (a.replication_lag(), b.replication_lag()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

/// Picker selection as named in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickerStrategy {
    #[default]
    Random,
    RoundRobin,
    Latency,
    ReplicationLag,
}

impl PickerStrategy {
    #[must_use]
    pub fn build(self) -> Arc<dyn NodePicker> {
        match self {
            Self::Random => Arc::new(RandomPicker),
            Self::RoundRobin => Arc::new(RoundRobinPicker::new()),
            Self::Latency => Arc::new(LatencyPicker),
            Self::ReplicationLag => Arc::new(ReplicationLagPicker),
        }
    }
}
