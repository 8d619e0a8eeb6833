//! Immutable result of one check round

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NodeCheckErrors;
use crate::node::{CheckedNode, ClusterNode, DeadNode, Node};
use crate::picker::NodePicker;

/// Which subset of the cluster a lookup wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Alive,
    Primary,
    Standby,
    /// Primary if one exists, otherwise any standby
    PreferPrimary,
    /// Standby if one exists, otherwise the primary
    PreferStandby,
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alive => "alive",
            Self::Primary => "primary",
            Self::Standby => "standby",
            Self::PreferPrimary => "prefer-primary",
            Self::PreferStandby => "prefer-standby",
        })
    }
}

/// Classification of every configured node as of one check round
///
/// `alive` is exactly `primaries` plus `standbys`; each list is sorted by the
/// cluster's picker. Never mutated after construction.
#[derive(Clone, Default)]
pub struct CheckedNodes {
    discovered: Vec<Arc<ClusterNode>>,
    alive: Vec<CheckedNode>,
    primaries: Vec<CheckedNode>,
    standbys: Vec<CheckedNode>,
    err: Option<Arc<NodeCheckErrors>>,
    checked_at: Option<DateTime<Utc>>,
}

impl CheckedNodes {
    pub(crate) fn new(
        discovered: Vec<Arc<ClusterNode>>,
        alive: Vec<CheckedNode>,
        primaries: Vec<CheckedNode>,
        standbys: Vec<CheckedNode>,
        err: Option<Arc<NodeCheckErrors>>,
    ) -> Self {
        Self {
            discovered,
            alive,
            primaries,
            standbys,
            err,
            checked_at: Some(Utc::now()),
        }
    }

    /// Snapshot with no nodes at all, used before the first round and after close
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn discovered(&self) -> &[Arc<ClusterNode>] {
        &self.discovered
    }

    #[must_use]
    pub fn alive(&self) -> &[CheckedNode] {
        &self.alive
    }

    #[must_use]
    pub fn primaries(&self) -> &[CheckedNode] {
        &self.primaries
    }

    #[must_use]
    pub fn standbys(&self) -> &[CheckedNode] {
        &self.standbys
    }

    /// Aggregate of every node that failed this round
    #[must_use]
    pub fn err(&self) -> Option<&Arc<NodeCheckErrors>> {
        self.err.as_ref()
    }

    /// When the round finished; `None` for the empty snapshot
    #[must_use]
    pub const fn checked_at(&self) -> Option<DateTime<Utc>> {
        self.checked_at
    }

    /// Nodes eligible for `criterion`, already in picker order
    #[must_use]
    pub fn candidates(&self, criterion: Criterion) -> &[CheckedNode] {
        match criterion {
            Criterion::Alive => &self.alive,
            Criterion::Primary => &self.primaries,
            Criterion::Standby => &self.standbys,
            Criterion::PreferPrimary if self.primaries.is_empty() => &self.standbys,
            Criterion::PreferPrimary => &self.primaries,
            Criterion::PreferStandby if self.standbys.is_empty() => &self.primaries,
            Criterion::PreferStandby => &self.standbys,
        }
    }

    #[must_use]
    pub fn satisfies(&self, criterion: Criterion) -> bool {
        !self.candidates(criterion).is_empty()
    }

    /// Pick one node for `criterion`, if any qualifies
    #[must_use]
    pub fn pick(&self, criterion: Criterion, picker: &dyn NodePicker) -> Option<CheckedNode> {
        picker.pick_node(self.candidates(criterion))
    }

    /// Pick one node, falling back to a dead node carrying this round's error
    #[must_use]
    pub fn node(&self, criterion: Criterion, picker: &dyn NodePicker) -> Node {
        self.pick(criterion, picker).map_or_else(
            || Node::Dead(DeadNode::new(self.err.clone())),
            Node::Checked,
        )
    }
}

impl fmt::Debug for CheckedNodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckedNodes")
            .field("discovered", &self.discovered.len())
            .field("primaries", &self.primaries)
            .field("standbys", &self.standbys)
            .field("err", &self.err.as_ref().map(ToString::to_string))
            .finish()
    }
}
