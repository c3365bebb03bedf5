//! The cluster capability consumed by the executor.
//!
//! Topology discovery, connection pooling, and wire framing live behind the
//! [`Cluster`] trait. The executor only asks two questions: which nodes hold
//! a key's partition, and what does a node answer for a group of keys.

use std::time::Duration;

use async_trait::async_trait;

use crate::batch::BinSelector;
use crate::error::NodeError;
use crate::key::Key;
use crate::record::Record;

pub type NodeId = u64;

/// A replica of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub rack: Option<u32>,
}

impl NodeInfo {
    pub fn new(id: NodeId, rack: Option<u32>) -> Self {
        Self { id, rack }
    }
}

/// One key inside a sub-request, tagged with its position in the batch.
#[derive(Debug, Clone)]
pub struct NodeBatchEntry {
    pub index: usize,
    pub key: Key,
    pub bins: BinSelector,
}

/// The keys sent to a single node in one round trip.
#[derive(Debug, Clone)]
pub struct NodeBatch {
    pub entries: Vec<NodeBatchEntry>,
    /// Round-trip deadline the node should honour, if bounded.
    pub timeout: Option<Duration>,
}

/// A node's definitive answer for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    Found(Record),
    NotFound,
}

/// One response row, tagged with the batch index it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    pub index: usize,
    pub outcome: KeyOutcome,
}

impl BatchRow {
    pub fn found(index: usize, record: Record) -> Self {
        Self {
            index,
            outcome: KeyOutcome::Found(record),
        }
    }

    pub fn not_found(index: usize) -> Self {
        Self {
            index,
            outcome: KeyOutcome::NotFound,
        }
    }
}

/// Routing table and transport for a cluster.
///
/// Implementations are shared across concurrent batch calls and must treat
/// both methods as reads of the current topology.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Replicas of the partition owning `key`, master first. Empty when the
    /// partition has no known owner.
    fn partition_replicas(&self, key: &Key) -> Vec<NodeInfo>;

    /// Executes one sub-request against `node`. Rows may arrive in any order;
    /// keys the node leaves unanswered are treated as node errors.
    async fn send_batch(&self, node: NodeId, batch: NodeBatch) -> Result<Vec<BatchRow>, NodeError>;
}
