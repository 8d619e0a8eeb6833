//! Observability hooks invoked by check rounds

use std::time::Duration;

use crate::error::Error;
use crate::node::{CheckedNode, ClusterNode};
use crate::snapshot::CheckedNodes;

/// Callbacks fired while the cluster updates its view of the nodes
///
/// Every method has an empty default so implementations override only what
/// they need. Hooks run inline on the round task and must not block.
pub trait Tracer: Send + Sync + 'static {
    /// A check round is starting
    fn update_nodes(&self) {}

    /// One node finished its check, successfully or not
    fn node_checked(&self, _node: &ClusterNode, _latency: Duration, _err: Option<&Error>) {}

    /// A node that was dead or never checked is now alive
    fn node_alive(&self, _node: &CheckedNode) {}

    /// A node that was alive or never checked failed its check
    fn node_dead(&self, _node: &ClusterNode, _err: &Error) {}

    /// A new snapshot has been published
    fn updated_nodes(&self, _nodes: &CheckedNodes) {}

    /// Blocked waiters were handed a node
    fn waiters_notified(&self, _count: usize) {}
}

/// Tracer that does nothing
#[derive(Debug, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// Default tracer: emits `tracing` events
#[derive(Debug, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn update_nodes(&self) {
        tracing::trace!("Checking database nodes");
    }

    fn node_alive(&self, node: &CheckedNode) {
        tracing::info!(
            node = %node.addr(),
            role = %node.role(),
            latency_ms = node.latency().as_millis() as u64,
            "Database node is alive"
        );
    }

    fn node_dead(&self, node: &ClusterNode, err: &Error) {
        tracing::warn!(node = %node.addr(), error = %err, "Database node is dead");
    }

    fn updated_nodes(&self, nodes: &CheckedNodes) {
        tracing::debug!(
            discovered = nodes.discovered().len(),
            primaries = nodes.primaries().len(),
            standbys = nodes.standbys().len(),
            failed = nodes.err().map_or(0, |e| e.len()),
            "Database nodes updated"
        );
        if nodes.primaries().is_empty() && !nodes.discovered().is_empty() {
            tracing::warn!("No primary database node available");
        }
    }

    fn waiters_notified(&self, count: usize) {
        tracing::debug!(count, "Notified waiters of available database node");
    }
}
