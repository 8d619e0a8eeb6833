//! One check round: probe every node concurrently and classify the results

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::Instrument;

use crate::checker::Checker;
use crate::error::{Error, NodeCheckError, NodeCheckErrors, Result};
use crate::node::{CheckedNode, ClusterNode, NodeInfo, NodeRole, NodeState};
use crate::picker::NodePicker;
use crate::snapshot::CheckedNodes;
use crate::tracer::Tracer;

/// Run the checker against every node and build the resulting snapshot
///
/// All probes share one deadline `timeout` from now. A probe that misses it
/// counts as a failed check for this round only.
pub(crate) async fn check_nodes(
    nodes: &[Arc<ClusterNode>],
    checker: &dyn Checker,
    picker: &dyn NodePicker,
    tracer: &dyn Tracer,
    timeout: Duration,
) -> CheckedNodes {
    let deadline = Instant::now() + timeout;

    let results = join_all(nodes.iter().map(|node| {
        let span = tracing::debug_span!("db_node_check", node = %node.addr());
        async move {
            let started = Instant::now();
            let result = match tokio::time::timeout_at(deadline, checker.check(node.connection().as_ref())).await {
                Ok(result) => result,
                Err(_) => Err(Error::CheckTimeout(timeout)),
            };
            (node, classify(result), started.elapsed())
        }
        .instrument(span)
    }))
    .await;

    let mut alive = Vec::with_capacity(nodes.len());
    let mut primaries = Vec::new();
    let mut standbys = Vec::new();
    let mut errors = Vec::new();

    for (node, result, latency) in results {
        tracer.node_checked(node, latency, result.as_ref().err());

        match result {
            Ok(info) => {
                let checked = CheckedNode::new(node.clone(), info, latency);
                if node.mark(NodeState::Alive) != NodeState::Alive {
                    tracer.node_alive(&checked);
                }
                if info.role == NodeRole::Primary {
                    primaries.push(checked.clone());
                } else {
                    standbys.push(checked.clone());
                }
                alive.push(checked);
            }
            Err(err) => {
                if node.mark(NodeState::Dead) != NodeState::Dead {
                    tracer.node_dead(node, &err);
                }
                errors.push(NodeCheckError::new(node.addr(), err));
            }
        }
    }

    alive.sort_by(|a, b| picker.compare_nodes(a, b));
    primaries.sort_by(|a, b| picker.compare_nodes(a, b));
    standbys.sort_by(|a, b| picker.compare_nodes(a, b));

    let err = (!errors.is_empty()).then(|| Arc::new(NodeCheckErrors::new(errors)));

    CheckedNodes::new(nodes.to_vec(), alive, primaries, standbys, err)
}

/// A node whose role is not clearly primary or standby is a failed check
fn classify(result: Result<NodeInfo>) -> Result<NodeInfo> {
    match result {
        Ok(info) if info.role == NodeRole::Unknown => Err(Error::CannotDetermineRole),
        other => other,
    }
}
