//! Registry of callers blocked until a node matching their criterion appears

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::node::CheckedNode;
use crate::picker::NodePicker;
use crate::snapshot::{CheckedNodes, Criterion};

struct Waiter {
    criterion: Criterion,
    tx: oneshot::Sender<CheckedNode>,
}

/// Single-use waiters, each consumed by at most one notification
///
/// The lock is taken only to register and to notify, never on snapshot reads.
#[derive(Default)]
pub(crate) struct WaitRegistry {
    waiters: Mutex<Vec<Waiter>>,
}

impl WaitRegistry {
    pub(crate) fn register(&self, criterion: Criterion) -> oneshot::Receiver<CheckedNode> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().push(Waiter { criterion, tx });
        rx
    }

    /// Hand a node to every waiter `nodes` can now satisfy
    ///
    /// Satisfied waiters and those whose caller went away are dropped; the
    /// rest stay for the next round. Returns how many waiters received a node.
    pub(crate) fn notify(&self, nodes: &CheckedNodes, picker: &dyn NodePicker) -> usize {
        let mut waiters = self.waiters.lock();
        if waiters.is_empty() {
            return 0;
        }

        let mut notified = 0;
        for waiter in std::mem::take(&mut *waiters) {
            if waiter.tx.is_closed() {
                continue;
            }
            match nodes.pick(waiter.criterion, picker) {
                Some(node) => {
                    if waiter.tx.send(node).is_ok() {
                        notified += 1;
                    }
                }
                None => waiters.push(waiter),
            }
        }
        notified
    }

    /// Drop every waiter; their receivers observe a closed channel
    pub(crate) fn clear(&self) {
        self.waiters.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ClusterNode, NodeInfo};
    use crate::picker::LatencyPicker;
    use crate::test_helpers::MockConnection;
    use std::sync::Arc;
    use std::time::Duration;

    fn primary_only() -> CheckedNodes {
        let node = Arc::new(ClusterNode::new(MockConnection::shared("p1")));
        let checked = CheckedNode::new(node.clone(), NodeInfo::primary(), Duration::from_millis(1));
        CheckedNodes::new(vec![node], vec![checked.clone()], vec![checked], vec![], None)
    }

    #[tokio::test]
    async fn test_notify_delivers_and_keeps_unsatisfied() {
        let registry = WaitRegistry::default();
        let primary_rx = registry.register(Criterion::Primary);
        let mut standby_rx = registry.register(Criterion::Standby);
        assert_eq!(registry.len(), 2);

        let notified = registry.notify(&primary_only(), &LatencyPicker);
        assert_eq!(notified, 1);
        assert_eq!(registry.len(), 1);

        let node = primary_rx.await.expect("primary waiter notified");
        assert_eq!(node.addr(), "p1");
        assert!(standby_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_abandoned_waiters_are_pruned() {
        let registry = WaitRegistry::default();
        drop(registry.register(Criterion::Standby));
        let _kept = registry.register(Criterion::Standby);

        assert_eq!(registry.notify(&primary_only(), &LatencyPicker), 0);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_closes_receivers() {
        let registry = WaitRegistry::default();
        let rx = registry.register(Criterion::Alive);
        registry.clear();
        assert!(rx.await.is_err());
        assert_eq!(registry.len(), 0);
    }
}
