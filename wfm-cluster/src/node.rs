//! Cluster members and the handles returned to callers

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::Postgres;

use crate::error::{Error, NodeCheckErrors, Result};

/// Query type accepted by [`Connection`], as built by `sqlx::query(..).bind(..)`
pub type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// One physical database connection pool tracked by the cluster
///
/// The cluster treats implementations as opaque: it only needs an address for
/// identification, the query primitives for checkers and callers, and a way to
/// release the pool at teardown.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Stable identity of the node (host:port or a configured name)
    fn addr(&self) -> &str;

    async fn fetch_all<'q>(&self, query: PgQuery<'q>) -> Result<Vec<PgRow>>;

    async fn fetch_optional<'q>(&self, query: PgQuery<'q>) -> Result<Option<PgRow>>;

    /// Execute a statement, returning the number of affected rows
    async fn execute<'q>(&self, query: PgQuery<'q>) -> Result<u64>;

    /// Execute statements atomically, returning affected rows per statement
    async fn batch<'q>(&self, queries: Vec<PgQuery<'q>>) -> Result<Vec<u64>>;

    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Liveness of a node as of its most recent check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Not checked yet
    Unknown,
    Alive,
    Dead,
}

impl NodeState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Alive => 1,
            Self::Dead => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Alive,
            2 => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

/// Role reported by a checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Unknown,
    Primary,
    Standby,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Primary => "primary",
            Self::Standby => "standby",
        })
    }
}

/// What a checker learned about a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfo {
    pub role: NodeRole,
    pub replication_lag: Option<Duration>,
}

impl NodeInfo {
    #[must_use]
    pub const fn new(role: NodeRole) -> Self {
        Self {
            role,
            replication_lag: None,
        }
    }

    #[must_use]
    pub const fn primary() -> Self {
        Self::new(NodeRole::Primary)
    }

    #[must_use]
    pub const fn standby() -> Self {
        Self::new(NodeRole::Standby)
    }

    /// Map the result of `pg_is_in_recovery()`; NULL leaves the role unknown
    #[must_use]
    pub const fn from_recovery(in_recovery: Option<bool>) -> Self {
        match in_recovery {
            Some(false) => Self::primary(),
            Some(true) => Self::standby(),
            None => Self::new(NodeRole::Unknown),
        }
    }

    #[must_use]
    pub const fn with_replication_lag(mut self, lag: Duration) -> Self {
        self.replication_lag = Some(lag);
        self
    }
}

/// A configured connection plus the liveness flag written by check rounds
pub struct ClusterNode {
    conn: Arc<dyn Connection>,
    state: AtomicU8,
}

impl ClusterNode {
    pub(crate) fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            conn,
            state: AtomicU8::new(NodeState::Unknown.as_u8()),
        }
    }

    #[must_use]
    pub fn addr(&self) -> &str {
        self.conn.addr()
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    #[must_use]
    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state() == NodeState::Alive
    }

    /// Store a new state and return the previous one
    pub(crate) fn mark(&self, state: NodeState) -> NodeState {
        NodeState::from_u8(self.state.swap(state.as_u8(), Ordering::AcqRel))
    }
}

impl fmt::Debug for ClusterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterNode")
            .field("addr", &self.addr())
            .field("state", &self.state())
            .finish()
    }
}

/// A node together with what one check round found out about it
#[derive(Clone)]
pub struct CheckedNode {
    node: Arc<ClusterNode>,
    info: NodeInfo,
    latency: Duration,
}

impl CheckedNode {
    pub(crate) fn new(node: Arc<ClusterNode>, info: NodeInfo, latency: Duration) -> Self {
        Self {
            node,
            info,
            latency,
        }
    }

    #[must_use]
    pub fn node(&self) -> &Arc<ClusterNode> {
        &self.node
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        self.node.connection()
    }

    #[must_use]
    pub fn addr(&self) -> &str {
        self.node.addr()
    }

    #[must_use]
    pub const fn info(&self) -> NodeInfo {
        self.info
    }

    #[must_use]
    pub const fn role(&self) -> NodeRole {
        self.info.role
    }

    /// Round-trip time of the check that produced this entry
    #[must_use]
    pub const fn latency(&self) -> Duration {
        self.latency
    }

    #[must_use]
    pub const fn replication_lag(&self) -> Option<Duration> {
        self.info.replication_lag
    }
}

impl fmt::Debug for CheckedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckedNode")
            .field("addr", &self.addr())
            .field("role", &self.info.role)
            .field("latency", &self.latency)
            .field("replication_lag", &self.info.replication_lag)
            .finish()
    }
}

/// Stand-in returned when no node satisfies a criterion
///
/// Every operation fails with [`Error::NodeDead`] carrying the aggregate
/// check error of the snapshot it was taken from.
#[derive(Debug, Clone, Default)]
pub struct DeadNode {
    cause: Option<Arc<NodeCheckErrors>>,
}

impl DeadNode {
    #[must_use]
    pub const fn new(cause: Option<Arc<NodeCheckErrors>>) -> Self {
        Self { cause }
    }

    #[must_use]
    pub fn cause(&self) -> Option<&Arc<NodeCheckErrors>> {
        self.cause.as_ref()
    }

    #[must_use]
    pub fn error(&self) -> Error {
        Error::NodeDead {
            cause: self.cause.clone(),
        }
    }
}

/// Handle returned by node selection
#[derive(Debug, Clone)]
pub enum Node {
    Checked(CheckedNode),
    Dead(DeadNode),
}

impl Node {
    #[must_use]
    pub fn addr(&self) -> Option<&str> {
        match self {
            Self::Checked(node) => Some(node.addr()),
            Self::Dead(_) => None,
        }
    }

    #[must_use]
    pub const fn is_dead(&self) -> bool {
        matches!(self, Self::Dead(_))
    }

    #[must_use]
    pub const fn as_checked(&self) -> Option<&CheckedNode> {
        match self {
            Self::Checked(node) => Some(node),
            Self::Dead(_) => None,
        }
    }

    #[must_use]
    pub fn role(&self) -> NodeRole {
        self.as_checked().map_or(NodeRole::Unknown, CheckedNode::role)
    }

    /// The underlying connection, or the dead-node error
    pub fn connection(&self) -> Result<&Arc<dyn Connection>> {
        match self {
            Self::Checked(node) => Ok(node.connection()),
            Self::Dead(dead) => Err(dead.error()),
        }
    }

    pub async fn fetch_all<'q>(&self, query: PgQuery<'q>) -> Result<Vec<PgRow>> {
        self.connection()?.fetch_all(query).await
    }

    pub async fn fetch_optional<'q>(&self, query: PgQuery<'q>) -> Result<Option<PgRow>> {
        self.connection()?.fetch_optional(query).await
    }

    pub async fn execute<'q>(&self, query: PgQuery<'q>) -> Result<u64> {
        self.connection()?.execute(query).await
    }

    pub async fn batch<'q>(&self, queries: Vec<PgQuery<'q>>) -> Result<Vec<u64>> {
        self.connection()?.batch(queries).await
    }
}

impl From<CheckedNode> for Node {
    fn from(node: CheckedNode) -> Self {
        Self::Checked(node)
    }
}
