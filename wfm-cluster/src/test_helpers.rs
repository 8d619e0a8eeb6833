//! Hand-written doubles for connections, checkers and tracers

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::postgres::PgRow;

use crate::checker::Checker;
use crate::error::{Error, Result};
use crate::node::{CheckedNode, ClusterNode, Connection, NodeInfo, NodeRole, PgQuery};
use crate::tracer::Tracer;

/// Connection that never talks to a server
pub struct MockConnection {
    addr: String,
    closed: AtomicBool,
    executed: AtomicUsize,
}

impl MockConnection {
    pub fn new(addr: &str) -> Arc<Self> {
        Arc::new(Self {
            addr: addr.to_string(),
            closed: AtomicBool::new(false),
            executed: AtomicUsize::new(0),
        })
    }

    pub fn shared(addr: &str) -> Arc<dyn Connection> {
        Self::new(addr)
    }

    /// Statements run through `execute` or `batch`
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn fetch_all<'q>(&self, _query: PgQuery<'q>) -> Result<Vec<PgRow>> {
        self.ensure_open()?;
        Ok(Vec::new())
    }

    async fn fetch_optional<'q>(&self, _query: PgQuery<'q>) -> Result<Option<PgRow>> {
        self.ensure_open()?;
        Ok(None)
    }

    async fn execute<'q>(&self, _query: PgQuery<'q>) -> Result<u64> {
        self.ensure_open()?;
        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }

    async fn batch<'q>(&self, queries: Vec<PgQuery<'q>>) -> Result<Vec<u64>> {
        self.ensure_open()?;
        self.executed.fetch_add(queries.len(), Ordering::SeqCst);
        Ok(vec![0; queries.len()])
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy)]
enum MockRole {
    Up(NodeRole),
    Down,
}

/// Checker scripted per address; unknown addresses are down
#[derive(Default)]
pub struct MockChecker {
    roles: Mutex<HashMap<String, MockRole>>,
    delays: Mutex<HashMap<String, Duration>>,
    checks: AtomicUsize,
}

impl MockChecker {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, addr: &str, role: MockRole) {
        self.roles.lock().insert(addr.to_string(), role);
    }

    pub fn set_primary(&self, addr: &str) {
        self.set(addr, MockRole::Up(NodeRole::Primary));
    }

    pub fn set_standby(&self, addr: &str) {
        self.set(addr, MockRole::Up(NodeRole::Standby));
    }

    pub fn set_unknown(&self, addr: &str) {
        self.set(addr, MockRole::Up(NodeRole::Unknown));
    }

    pub fn set_down(&self, addr: &str) {
        self.set(addr, MockRole::Down);
    }

    pub fn set_delay(&self, addr: &str, delay: Duration) {
        self.delays.lock().insert(addr.to_string(), delay);
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Checker for MockChecker {
    async fn check(&self, conn: &dyn Connection) -> Result<NodeInfo> {
        self.checks.fetch_add(1, Ordering::SeqCst);

        let delay = self.delays.lock().get(conn.addr()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let role = self.roles.lock().get(conn.addr()).copied();
        match role {
            Some(MockRole::Up(role)) => Ok(NodeInfo::new(role)),
            Some(MockRole::Down) | None => Err(Error::Database(sqlx::Error::PoolTimedOut)),
        }
    }
}

/// Tracer that records transitions by address
#[derive(Default)]
pub struct RecordingTracer {
    alive: Mutex<Vec<String>>,
    dead: Mutex<Vec<String>>,
    checked: AtomicUsize,
}

impl RecordingTracer {
    pub fn alive_events(&self) -> Vec<String> {
        self.alive.lock().clone()
    }

    pub fn dead_events(&self) -> Vec<String> {
        self.dead.lock().clone()
    }

    pub fn checked_count(&self) -> usize {
        self.checked.load(Ordering::SeqCst)
    }
}

impl Tracer for RecordingTracer {
    fn node_checked(&self, _node: &ClusterNode, _latency: Duration, _err: Option<&Error>) {
        self.checked.fetch_add(1, Ordering::SeqCst);
    }

    fn node_alive(&self, node: &CheckedNode) {
        self.alive.lock().push(node.addr().to_string());
    }

    fn node_dead(&self, node: &ClusterNode, _err: &Error) {
        self.dead.lock().push(node.addr().to_string());
    }
}
