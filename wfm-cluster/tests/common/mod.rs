use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::postgres::PgRow;
use wfm_cluster::{Checker, Connection, Error, NodeInfo, NodeRole, PgQuery, Result};

pub struct FakeConnection {
    addr: String,
    closed: AtomicBool,
}

impl FakeConnection {
    pub fn new(addr: &str) -> Arc<Self> {
        Arc::new(Self {
            addr: addr.to_string(),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn fetch_all<'q>(&self, _query: PgQuery<'q>) -> Result<Vec<PgRow>> {
        Ok(Vec::new())
    }

    async fn fetch_optional<'q>(&self, _query: PgQuery<'q>) -> Result<Option<PgRow>> {
        Ok(None)
    }

    async fn execute<'q>(&self, _query: PgQuery<'q>) -> Result<u64> {
        Ok(1)
    }

    async fn batch<'q>(&self, queries: Vec<PgQuery<'q>>) -> Result<Vec<u64>> {
        Ok(vec![1; queries.len()])
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Topology switchboard: addresses missing from the map are unreachable
#[derive(Default)]
pub struct Topology {
    roles: Mutex<HashMap<String, NodeRole>>,
}

impl Topology {
    pub fn set(&self, addr: &str, role: NodeRole) {
        self.roles.lock().insert(addr.to_string(), role);
    }

    pub fn remove(&self, addr: &str) {
        self.roles.lock().remove(addr);
    }
}

#[async_trait]
impl Checker for Topology {
    async fn check(&self, conn: &dyn Connection) -> Result<NodeInfo> {
        self.roles
            .lock()
            .get(conn.addr())
            .map(|role| NodeInfo::new(*role))
            .ok_or(Error::Database(sqlx::Error::PoolTimedOut))
    }
}
