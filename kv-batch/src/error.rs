//! Error types for the batch read layer.
//!
//! Two layers of failure exist and they never mix:
//!
//! - [`BatchError`] is returned from constructors and from
//!   [`crate::executor::BatchExecutor::execute_batch_read`] when the call
//!   itself cannot proceed (bad identifiers, contradictory policy, malformed
//!   request). Nothing has been sent to the cluster when one of these occurs.
//! - [`NodeError`] describes a failed round trip to one node. The executor
//!   consumes it internally (retry, fail over, or finalize the affected keys)
//!   and it never escapes as a call failure.

use thiserror::Error;

use crate::cluster::NodeId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

/// Failure of a single node round trip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("node {node} unreachable: {reason}")]
    Unreachable { node: NodeId, reason: String },
    #[error("node {node} timed out")]
    Timeout { node: NodeId },
    #[error("node {node} busy")]
    ServerBusy { node: NodeId },
    #[error("node {node} failed: {reason}")]
    Fatal { node: NodeId, reason: String },
}

impl NodeError {
    /// Whether the affected keys may be re-routed and re-issued.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, NodeError::Fatal { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, NodeError::Timeout { .. })
    }

    pub fn node(&self) -> NodeId {
        match self {
            NodeError::Unreachable { node, .. }
            | NodeError::Timeout { node }
            | NodeError::ServerBusy { node }
            | NodeError::Fatal { node, .. } => *node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_is_the_only_non_retriable_error() {
        assert!(NodeError::Timeout { node: 1 }.is_retriable());
        assert!(NodeError::ServerBusy { node: 1 }.is_retriable());
        assert!(NodeError::Unreachable {
            node: 1,
            reason: "refused".into()
        }
        .is_retriable());
        assert!(!NodeError::Fatal {
            node: 1,
            reason: "bad namespace".into()
        }
        .is_retriable());
    }

    #[test]
    fn node_is_reported_for_every_variant() {
        assert_eq!(NodeError::Timeout { node: 7 }.node(), 7);
        assert_eq!(
            NodeError::Fatal {
                node: 3,
                reason: "x".into()
            }
            .node(),
            3
        );
    }
}
