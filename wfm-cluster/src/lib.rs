//! Health-checked PostgreSQL cluster for the workforce management backend
//!
//! Tracks a fixed set of database nodes, classifies each as primary or
//! standby on a timer, and hands out nodes matching a [`Criterion`].

pub mod checker;
pub mod cluster;
pub mod error;
pub mod node;
pub mod picker;
pub mod postgres;
pub mod snapshot;
pub mod tracer;

mod round;
mod waiter;

#[cfg(test)]
mod test_helpers;

pub use checker::{Checker, CheckerKind, PostgresChecker, ReplicationLagChecker};
pub use cluster::{Cluster, ClusterOptions, DEFAULT_UPDATE_INTERVAL, DEFAULT_UPDATE_TIMEOUT};
pub use error::{Error, NodeCheckError, NodeCheckErrors, Result};
pub use node::{CheckedNode, ClusterNode, Connection, DeadNode, Node, NodeInfo, NodeRole, NodeState, PgQuery};
pub use picker::{LatencyPicker, NodePicker, PickerStrategy, RandomPicker, ReplicationLagPicker, RoundRobinPicker};
pub use postgres::PostgresConnection;
pub use snapshot::{CheckedNodes, Criterion};
pub use tracer::{LogTracer, NoopTracer, Tracer};
