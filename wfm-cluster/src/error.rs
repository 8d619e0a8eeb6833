//! Error types for the database cluster

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::snapshot::Criterion;

/// Cluster error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("Cluster requires at least one connection")]
    NoConnections,

    /// Returned by the fallback node when no real node matched a criterion.
    #[error("Database node is dead")]
    NodeDead {
        #[source]
        cause: Option<Arc<NodeCheckErrors>>,
    },

    #[error("Cannot determine node role")]
    CannotDetermineRole,

    #[error("Node check timed out after {0:?}")]
    CheckTimeout(Duration),

    #[error("Primary database not alive")]
    PrimaryNotAlive {
        #[source]
        cause: Option<Arc<NodeCheckErrors>>,
    },

    #[error("Deadline exceeded while waiting for {0} node")]
    DeadlineExceeded(Criterion),

    #[error("Cluster is closed")]
    ClusterClosed,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// Whether the error means no usable node was available
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::NodeDead { .. }
                | Self::PrimaryNotAlive { .. }
                | Self::DeadlineExceeded(_)
                | Self::ClusterClosed
        )
    }
}

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single node during one check round
#[derive(Debug, Error)]
#[error("{addr}: {source}")]
pub struct NodeCheckError {
    addr: String,
    #[source]
    source: Error,
}

impl NodeCheckError {
    #[must_use]
    pub fn new(addr: impl Into<String>, source: Error) -> Self {
        Self {
            addr: addr.into(),
            source,
        }
    }

    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    #[must_use]
    pub const fn error(&self) -> &Error {
        &self.source
    }
}

/// Aggregate of every node failure seen in one check round
///
/// A round with some failures still produces a usable snapshot. Compare
/// [`NodeCheckErrors::len`] with the number of discovered nodes to tell a
/// degraded cluster from one that is completely down.
#[derive(Debug, Default)]
pub struct NodeCheckErrors {
    errors: Vec<NodeCheckError>,
}

impl NodeCheckErrors {
    #[must_use]
    pub fn new(errors: Vec<NodeCheckError>) -> Self {
        Self { errors }
    }

    #[must_use]
    pub fn errors(&self) -> &[NodeCheckError] {
        &self.errors
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Error reported for a specific node, if it failed
    #[must_use]
    pub fn get(&self, addr: &str) -> Option<&NodeCheckError> {
        self.errors.iter().find(|e| e.addr == addr)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeCheckError> {
        self.errors.iter()
    }
}

impl<'a> IntoIterator for &'a NodeCheckErrors {
    type Item = &'a NodeCheckError;
    type IntoIter = std::slice::Iter<'a, NodeCheckError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl fmt::Display for NodeCheckErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} node(s) failed check", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for NodeCheckErrors {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn sample() -> NodeCheckErrors {
        NodeCheckErrors::new(vec![
            NodeCheckError::new("db-1", Error::CannotDetermineRole),
            NodeCheckError::new("db-2", Error::CheckTimeout(Duration::from_secs(1))),
        ])
    }

    #[test]
    fn test_display_lists_every_node() {
        let msg = sample().to_string();
        assert!(msg.starts_with("2 node(s) failed check"));
        assert!(msg.contains("db-1: Cannot determine node role"));
        assert!(msg.contains("db-2: Node check timed out"));
    }

    #[test]
    fn test_lookup_by_addr() {
        let errors = sample();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            errors.get("db-1").map(NodeCheckError::error),
            Some(Error::CannotDetermineRole)
        ));
        assert!(errors.get("db-3").is_none());
        assert_eq!(errors.iter().map(NodeCheckError::addr).collect::<Vec<_>>(), ["db-1", "db-2"]);
    }

    #[test]
    fn test_node_dead_chains_cause() {
        let err = Error::NodeDead {
            cause: Some(Arc::new(sample())),
        };
        let source = err.source().expect("node dead should carry its cause");
        assert!(source.to_string().contains("2 node(s) failed check"));
        assert!(err.is_unavailable());

        let bare = Error::NodeDead { cause: None };
        assert!(bare.source().is_none());
    }
}
