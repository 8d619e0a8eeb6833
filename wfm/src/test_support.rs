//! Cluster fixtures shared by the server and HTTP tests

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use wfm_cluster::{Checker, Cluster, ClusterOptions, Connection, NodeInfo, PgQuery, Result};

pub struct FakeConnection(pub &'static str);

#[async_trait]
impl Connection for FakeConnection {
    fn addr(&self) -> &str {
        self.0
    }
    async fn fetch_all<'q>(&self, _query: PgQuery<'q>) -> Result<Vec<PgRow>> {
        Ok(Vec::new())
    }
    async fn fetch_optional<'q>(&self, _query: PgQuery<'q>) -> Result<Option<PgRow>> {
        Ok(None)
    }
    async fn execute<'q>(&self, _query: PgQuery<'q>) -> Result<u64> {
        Ok(0)
    }
    async fn batch<'q>(&self, queries: Vec<PgQuery<'q>>) -> Result<Vec<u64>> {
        Ok(vec![0; queries.len()])
    }
    async fn close(&self) {}
    fn is_closed(&self) -> bool {
        false
    }
}

/// "db-primary" is the primary, everything else is unreachable
pub struct FixedChecker;

#[async_trait]
impl Checker for FixedChecker {
    async fn check(&self, conn: &dyn Connection) -> Result<NodeInfo> {
        if conn.addr() == "db-primary" {
            Ok(NodeInfo::primary())
        } else {
            Err(wfm_cluster::Error::Database(sqlx::Error::PoolTimedOut))
        }
    }
}

/// Cluster over fake nodes with the background loop disabled
pub async fn fake_cluster(addrs: &[&'static str]) -> Arc<Cluster> {
    let conns = addrs
        .iter()
        .map(|addr| Arc::new(FakeConnection(*addr)) as Arc<dyn Connection>)
        .collect();
    let options = ClusterOptions::default()
        .with_checker(Arc::new(FixedChecker))
        .with_periodic_updates(false);
    Arc::new(Cluster::new(conns, options).await.expect("cluster"))
}
