//! Node role probes

use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;

use crate::error::Result;
use crate::node::{Connection, NodeInfo};

/// Determines whether a node is reachable and which role it holds
///
/// Any error marks the node dead for the current round. Returning
/// [`crate::NodeRole::Unknown`] is also treated as a failure.
#[async_trait]
pub trait Checker: Send + Sync + 'static {
    async fn check(&self, conn: &dyn Connection) -> Result<NodeInfo>;
}

const RECOVERY_QUERY: &str = "SELECT pg_is_in_recovery()";

// NULL lag means the standby has not replayed anything yet
const REPLICATION_LAG_QUERY: &str = "SELECT pg_is_in_recovery() AS in_recovery,
        CASE WHEN pg_is_in_recovery()
             THEN EXTRACT(EPOCH FROM now() - pg_last_xact_replay_timestamp())::float8
             ELSE 0::float8
        END AS lag_seconds";

/// Default PostgreSQL checker: a standby is a server in recovery
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresChecker;

#[async_trait]
impl Checker for PostgresChecker {
    async fn check(&self, conn: &dyn Connection) -> Result<NodeInfo> {
        let in_recovery = match conn.fetch_optional(sqlx::query(RECOVERY_QUERY)).await? {
            Some(row) => row.try_get::<Option<bool>, _>(0)?,
            None => None,
        };
        Ok(NodeInfo::from_recovery(in_recovery))
    }
}

/// PostgreSQL checker that also reports replay lag for standbys
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicationLagChecker;

#[async_trait]
impl Checker for ReplicationLagChecker {
    async fn check(&self, conn: &dyn Connection) -> Result<NodeInfo> {
        let Some(row) = conn.fetch_optional(sqlx::query(REPLICATION_LAG_QUERY)).await? else {
            return Ok(NodeInfo::from_recovery(None));
        };

        Ok(replication_info(
            row.try_get("in_recovery")?,
            row.try_get("lag_seconds")?,
        ))
    }
}

/// Map a replication lag row to node info
///
/// An unknown lag stays `None` so the node ranks behind every measured one.
/// Clock skew between servers can yield a negative lag, which counts as zero.
fn replication_info(in_recovery: Option<bool>, lag_seconds: Option<f64>) -> NodeInfo {
    let info = NodeInfo::from_recovery(in_recovery);
    match lag_seconds {
        Some(secs) if secs.is_finite() => {
            info.with_replication_lag(Duration::from_secs_f64(secs.max(0.0)))
        }
        _ => info,
    }
}

/// Which built-in checker to use, as named in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckerKind {
    #[default]
    Recovery,
    ReplicationLag,
}

impl CheckerKind {
    #[must_use]
    pub fn build(self) -> std::sync::Arc<dyn Checker> {
        match self {
            Self::Recovery => std::sync::Arc::new(PostgresChecker),
            Self::ReplicationLag => std::sync::Arc::new(ReplicationLagChecker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_helpers::MockConnection;

    #[tokio::test]
    async fn test_postgres_checker_without_rows_is_unknown() {
        // The mock returns no rows, which a real server never does
        let conn = MockConnection::new("db-1");
        let info = PostgresChecker.check(conn.as_ref()).await.expect("check");
        assert_eq!(info.role, crate::NodeRole::Unknown);
    }

    #[tokio::test]
    async fn test_checker_propagates_connection_errors() {
        let conn = MockConnection::new("db-1");
        conn.close().await;
        let err = ReplicationLagChecker
            .check(conn.as_ref())
            .await
            .expect_err("closed connection must fail");
        assert!(matches!(err, Error::Database(_)));
    }

    #[test]
    fn test_replication_info_without_replay_has_no_lag() {
        let info = replication_info(Some(true), None);
        assert_eq!(info.role, crate::NodeRole::Standby);
        assert_eq!(info.replication_lag, None);

        let info = replication_info(Some(true), Some(f64::NAN));
        assert_eq!(info.replication_lag, None);
    }

    #[test]
    fn test_replication_info_clamps_negative_lag() {
        let info = replication_info(Some(true), Some(-0.5));
        assert_eq!(info.role, crate::NodeRole::Standby);
        assert_eq!(info.replication_lag, Some(Duration::ZERO));
    }

    #[test]
    fn test_replication_info_keeps_measured_lag() {
        let info = replication_info(Some(true), Some(2.5));
        assert_eq!(info.replication_lag, Some(Duration::from_millis(2500)));

        let info = replication_info(Some(false), Some(0.0));
        assert_eq!(info.role, crate::NodeRole::Primary);
        assert_eq!(info.replication_lag, Some(Duration::ZERO));

        let info = replication_info(None, None);
        assert_eq!(info.role, crate::NodeRole::Unknown);
    }

    #[test]
    fn test_checker_kind_from_config() {
        let kind: CheckerKind = serde_json::from_str("\"replication_lag\"").expect("parse");
        assert_eq!(kind, CheckerKind::ReplicationLag);
        assert_eq!(CheckerKind::default(), CheckerKind::Recovery);
    }

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_postgres_checker_against_database() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let conn = crate::PostgresConnection::connect_lazy("primary", &url, Default::default())
            .expect("pool");
        let info = PostgresChecker.check(&conn).await.expect("check");
        assert_ne!(info.role, crate::NodeRole::Unknown);
    }
}
