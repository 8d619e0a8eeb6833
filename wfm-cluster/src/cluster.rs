//! Self-updating view of a fixed set of database nodes
//!
//! A [`Cluster`] checks every node once before it is handed out, then keeps
//! rechecking on a timer. Each round publishes a fresh immutable
//! [`CheckedNodes`] snapshot with a single atomic swap, so lookups never lock
//! and never observe a half-updated classification.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::checker::{Checker, PostgresChecker};
use crate::error::{Error, NodeCheckErrors, Result};
use crate::node::{CheckedNode, ClusterNode, Connection, Node};
use crate::picker::{NodePicker, RandomPicker};
use crate::round::check_nodes;
use crate::snapshot::{CheckedNodes, Criterion};
use crate::tracer::{LogTracer, Tracer};
use crate::waiter::WaitRegistry;

/// Default time between check rounds
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(15);

/// Default deadline for one check round
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(11);

/// Construction options, fixed for the lifetime of the cluster
#[derive(Clone)]
pub struct ClusterOptions {
    pub update_interval: Duration,
    pub update_timeout: Duration,
    pub checker: Arc<dyn Checker>,
    pub picker: Arc<dyn NodePicker>,
    /// Run rounds on a timer; when off, rounds run only via [`Cluster::update_nodes`]
    pub periodic_updates: bool,
    pub tracer: Arc<dyn Tracer>,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            update_timeout: DEFAULT_UPDATE_TIMEOUT,
            checker: Arc::new(PostgresChecker),
            picker: Arc::new(RandomPicker),
            periodic_updates: true,
            tracer: Arc::new(LogTracer),
        }
    }
}

impl ClusterOptions {
    #[must_use]
    pub const fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_update_timeout(mut self, timeout: Duration) -> Self {
        self.update_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_checker(mut self, checker: Arc<dyn Checker>) -> Self {
        self.checker = checker;
        self
    }

    #[must_use]
    pub fn with_picker(mut self, picker: Arc<dyn NodePicker>) -> Self {
        self.picker = picker;
        self
    }

    #[must_use]
    pub const fn with_periodic_updates(mut self, enabled: bool) -> Self {
        self.periodic_updates = enabled;
        self
    }

    #[must_use]
    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }
}

struct ClusterInner {
    nodes: Vec<Arc<ClusterNode>>,
    checked: ArcSwap<CheckedNodes>,
    waiters: WaitRegistry,
    checker: Arc<dyn Checker>,
    picker: Arc<dyn NodePicker>,
    tracer: Arc<dyn Tracer>,
    update_timeout: Duration,
    /// Serializes rounds so snapshots are published in order
    update_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl ClusterInner {
    fn load(&self) -> Arc<CheckedNodes> {
        self.checked.load_full()
    }

    fn node(&self, criterion: Criterion) -> Node {
        self.checked.load().node(criterion, self.picker.as_ref())
    }

    fn pick(&self, criterion: Criterion) -> Option<CheckedNode> {
        self.checked.load().pick(criterion, self.picker.as_ref())
    }

    async fn update_nodes(&self) {
        let _guard = self.update_lock.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        self.tracer.update_nodes();
        let checked = Arc::new(
            check_nodes(
                &self.nodes,
                self.checker.as_ref(),
                self.picker.as_ref(),
                self.tracer.as_ref(),
                self.update_timeout,
            )
            .instrument(tracing::debug_span!("db_round", nodes = self.nodes.len()))
            .await,
        );

        self.checked.store(checked.clone());
        self.tracer.updated_nodes(&checked);

        let notified = self.waiters.notify(&checked, self.picker.as_ref());
        if notified > 0 {
            self.tracer.waiters_notified(notified);
        }
    }
}

/// Database cluster handle shared by every storage component
pub struct Cluster {
    inner: Arc<ClusterInner>,
    cancel_token: CancellationToken,
    update_task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("nodes", &self.nodes())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Cluster {
    /// Create a cluster over a fixed set of connections
    ///
    /// Runs the first check round before returning, so the first lookup
    /// already sees a real snapshot.
    pub async fn new(connections: Vec<Arc<dyn Connection>>, options: ClusterOptions) -> Result<Self> {
        if connections.is_empty() {
            return Err(Error::NoConnections);
        }

        let nodes = connections
            .into_iter()
            .map(|conn| Arc::new(ClusterNode::new(conn)))
            .collect();

        let inner = Arc::new(ClusterInner {
            nodes,
            checked: ArcSwap::from_pointee(CheckedNodes::empty()),
            waiters: WaitRegistry::default(),
            checker: options.checker,
            picker: options.picker,
            tracer: options.tracer,
            update_timeout: options.update_timeout,
            update_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        });

        inner.update_nodes().await;

        let cancel_token = CancellationToken::new();
        let update_task = options.periodic_updates.then(|| {
            Self::spawn_update_loop(inner.clone(), options.update_interval, cancel_token.clone())
        });

        tracing::info!(
            nodes = inner.nodes.len(),
            periodic_updates = options.periodic_updates,
            update_interval = ?options.update_interval,
            "Database cluster initialized"
        );

        Ok(Self {
            inner,
            cancel_token,
            update_task: Mutex::new(update_task),
        })
    }

    fn spawn_update_loop(
        inner: Arc<ClusterInner>,
        update_interval: Duration,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let mut timer = interval_at(Instant::now() + update_interval, update_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        tracing::debug!("Database cluster update loop shutting down");
                        return;
                    }
                    _ = timer.tick() => {
                        tokio::select! {
                            () = cancel_token.cancelled() => return,
                            () = inner.update_nodes() => {}
                        }
                    }
                }
            }
        })
    }

    /// Run one check round now and publish its snapshot
    pub async fn update_nodes(&self) {
        self.inner.update_nodes().await;
    }

    /// Every configured node, in construction order
    #[must_use]
    pub fn nodes(&self) -> &[Arc<ClusterNode>] {
        &self.inner.nodes
    }

    /// The current snapshot
    #[must_use]
    pub fn checked_nodes(&self) -> Arc<CheckedNodes> {
        self.inner.load()
    }

    /// Aggregate failure of the latest round
    #[must_use]
    pub fn err(&self) -> Option<Arc<NodeCheckErrors>> {
        self.inner.checked.load().err().cloned()
    }

    /// Node matching `criterion`, or the dead fallback
    #[must_use]
    pub fn node(&self, criterion: Criterion) -> Node {
        self.inner.node(criterion)
    }

    #[must_use]
    pub fn primary(&self) -> Node {
        self.node(Criterion::Primary)
    }

    #[must_use]
    pub fn standby(&self) -> Node {
        self.node(Criterion::Standby)
    }

    #[must_use]
    pub fn alive(&self) -> Node {
        self.node(Criterion::Alive)
    }

    #[must_use]
    pub fn prefer_primary(&self) -> Node {
        self.node(Criterion::PreferPrimary)
    }

    #[must_use]
    pub fn prefer_standby(&self) -> Node {
        self.node(Criterion::PreferStandby)
    }

    /// Wait until a node matching `criterion` exists
    ///
    /// Returns at once if the current snapshot already has one. Dropping the
    /// future cancels the wait. Fails with [`Error::ClusterClosed`] if the
    /// cluster is or becomes closed.
    pub async fn wait_for_node(&self, criterion: Criterion) -> Result<Node> {
        if self.is_closed() {
            return Err(Error::ClusterClosed);
        }
        if let Some(node) = self.inner.pick(criterion) {
            return Ok(Node::Checked(node));
        }

        let rx = self.inner.waiters.register(criterion);

        // A round may have published between the first check and registering
        if let Some(node) = self.inner.pick(criterion) {
            return Ok(Node::Checked(node));
        }
        if self.is_closed() {
            return Err(Error::ClusterClosed);
        }

        rx.instrument(tracing::debug_span!("db_wait", criterion = %criterion))
            .await
            .map(Node::Checked)
            .map_err(|_| Error::ClusterClosed)
    }

    /// [`Self::wait_for_node`] bounded by `timeout`
    pub async fn wait_for_node_timeout(&self, criterion: Criterion, timeout: Duration) -> Result<Node> {
        tokio::time::timeout(timeout, self.wait_for_node(criterion))
            .await
            .map_err(|_| Error::DeadlineExceeded(criterion))?
    }

    pub async fn wait_for_primary(&self) -> Result<Node> {
        self.wait_for_node(Criterion::Primary).await
    }

    pub async fn wait_for_standby(&self) -> Result<Node> {
        self.wait_for_node(Criterion::Standby).await
    }

    pub async fn wait_for_alive(&self) -> Result<Node> {
        self.wait_for_node(Criterion::Alive).await
    }

    pub async fn wait_for_prefer_primary(&self) -> Result<Node> {
        self.wait_for_node(Criterion::PreferPrimary).await
    }

    pub async fn wait_for_prefer_standby(&self) -> Result<Node> {
        self.wait_for_node(Criterion::PreferStandby).await
    }

    pub async fn wait_for_primary_timeout(&self, timeout: Duration) -> Result<Node> {
        self.wait_for_node_timeout(Criterion::Primary, timeout).await
    }

    pub async fn wait_for_standby_timeout(&self, timeout: Duration) -> Result<Node> {
        self.wait_for_node_timeout(Criterion::Standby, timeout).await
    }

    pub async fn wait_for_alive_timeout(&self, timeout: Duration) -> Result<Node> {
        self.wait_for_node_timeout(Criterion::Alive, timeout).await
    }

    pub async fn wait_for_prefer_primary_timeout(&self, timeout: Duration) -> Result<Node> {
        self.wait_for_node_timeout(Criterion::PreferPrimary, timeout).await
    }

    pub async fn wait_for_prefer_standby_timeout(&self, timeout: Duration) -> Result<Node> {
        self.wait_for_node_timeout(Criterion::PreferStandby, timeout).await
    }

    /// Healthy means a primary is currently available
    pub fn health_check(&self) -> Result<()> {
        let checked = self.inner.checked.load();
        if checked.primaries().is_empty() {
            return Err(Error::PrimaryNotAlive {
                cause: checked.err().cloned(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop updating, close every connection and forget the snapshot
    ///
    /// The update loop has exited before any connection is closed. Blocked
    /// waiters fail with [`Error::ClusterClosed`]. Calling it again is a no-op.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel_token.cancel();
        let update_task = self.update_task.lock().take();
        if let Some(handle) = update_task {
            if let Err(e) = handle.await {
                tracing::error!("Database cluster update loop failed: {}", e);
            }
        }

        // Wait out a manual round that may still be probing
        let _guard = self.inner.update_lock.lock().await;

        for node in &self.inner.nodes {
            node.connection().close().await;
        }

        self.inner.checked.store(Arc::new(CheckedNodes::empty()));
        self.inner.waiters.clear();

        tracing::info!(nodes = self.inner.nodes.len(), "Database cluster closed");
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
