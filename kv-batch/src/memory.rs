//! In-process cluster.
//!
//! [`MemoryCluster`] implements [`Cluster`] over a single shared map. Every
//! node sees the same data, so it behaves like a fully replicated cluster
//! whose nodes can be made slow, busy, unreachable, or silent one at a time.
//! Partition ownership is fixed: partition `p` is mastered by node
//! `p % nodes` and replicated to the following nodes in order.
//!
//! The cluster also counts calls and in-flight sub-requests so callers can
//! observe how a batch was dispatched.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::batch::BinSelector;
use crate::cluster::{BatchRow, Cluster, NodeBatch, NodeId, NodeInfo};
use crate::error::NodeError;
use crate::key::Key;
use crate::record::Record;
use crate::value::{Bin, Value};

/// Misbehaviour injected into a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Connection refused.
    Down,
    /// Server busy, try again.
    Busy,
    /// Accepts the request and never answers.
    Hang,
    /// Non-retriable server error.
    Fatal(String),
    /// Answers, but omits every row.
    Silent,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    bins: HashMap<String, Value>,
    generation: u32,
    expiration: u32,
}

#[derive(Debug, Clone)]
struct ActiveFault {
    fault: Fault,
    /// Calls left before the fault clears; `None` keeps it forever.
    remaining: Option<u32>,
}

#[derive(Default)]
struct NodeState {
    latency: Duration,
    fault: Option<ActiveFault>,
    calls: usize,
}

pub struct MemoryCluster {
    nodes: Vec<NodeInfo>,
    replication_factor: usize,
    data: Mutex<HashMap<Key, StoredRecord>>,
    state: Mutex<HashMap<NodeId, NodeState>>,
    orphaned: Mutex<HashSet<u16>>,
    key_attempts: Mutex<HashMap<Key, u32>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MemoryCluster {
    /// Creates a cluster over `nodes` where each partition has
    /// `replication_factor` replicas, clamped to `1..=nodes.len()`.
    pub fn new(nodes: Vec<NodeInfo>, replication_factor: usize) -> Self {
        let replication_factor = replication_factor.clamp(1, nodes.len().max(1));
        let state = nodes.iter().map(|node| (node.id, NodeState::default())).collect();
        Self {
            nodes,
            replication_factor,
            data: Mutex::new(HashMap::new()),
            state: Mutex::new(state),
            orphaned: Mutex::new(HashSet::new()),
            key_attempts: Mutex::new(HashMap::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `count` nodes with ids `1..=count`, no racks.
    pub fn with_nodes(count: u64, replication_factor: usize) -> Self {
        let nodes = (1..=count).map(|id| NodeInfo::new(id, None)).collect();
        Self::new(nodes, replication_factor)
    }

    /// Stores `bins` under `key`, replacing earlier bins and bumping the
    /// generation.
    pub fn put<I>(&self, key: &Key, bins: I)
    where
        I: IntoIterator<Item = Bin>,
    {
        self.put_with_expiration(key, bins, 0);
    }

    pub fn put_with_expiration<I>(&self, key: &Key, bins: I, expiration: u32)
    where
        I: IntoIterator<Item = Bin>,
    {
        let mut data = self.data.lock();
        let generation = data.get(key).map_or(0, |stored| stored.generation) + 1;
        data.insert(
            key.clone(),
            StoredRecord {
                bins: bins.into_iter().map(|bin| (bin.name, bin.value)).collect(),
                generation,
                expiration,
            },
        );
    }

    pub fn set_latency(&self, node: NodeId, latency: Duration) {
        if let Some(state) = self.state.lock().get_mut(&node) {
            state.latency = latency;
        }
    }

    /// Injects `fault` into `node` for every following sub-request.
    pub fn set_fault(&self, node: NodeId, fault: Fault) {
        self.install_fault(node, fault, None);
    }

    /// Injects `fault` into `node` for the next `calls` sub-requests.
    pub fn set_fault_for(&self, node: NodeId, fault: Fault, calls: u32) {
        self.install_fault(node, fault, Some(calls));
    }

    fn install_fault(&self, node: NodeId, fault: Fault, remaining: Option<u32>) {
        if let Some(state) = self.state.lock().get_mut(&node) {
            state.fault = Some(ActiveFault { fault, remaining });
        }
    }

    /// Forgets every replica of `partition_id`.
    pub fn orphan_partition(&self, partition_id: u16) {
        self.orphaned.lock().insert(partition_id);
    }

    /// Sub-requests received by `node`.
    pub fn calls(&self, node: NodeId) -> usize {
        self.state.lock().get(&node).map_or(0, |state| state.calls)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().values().map(|state| state.calls).sum()
    }

    /// Times `key` was sent to any node.
    pub fn key_attempts(&self, key: &Key) -> u32 {
        self.key_attempts.lock().get(key).copied().unwrap_or(0)
    }

    /// Highest number of sub-requests that were in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Registers a call and returns the node's latency and the fault to
    /// apply to it, consuming one use of a transient fault.
    fn begin_call(&self, node: NodeId, batch: &NodeBatch) -> Option<(Duration, Option<Fault>)> {
        {
            let mut attempts = self.key_attempts.lock();
            for entry in &batch.entries {
                *attempts.entry(entry.key.clone()).or_insert(0) += 1;
            }
        }

        let mut states = self.state.lock();
        let state = states.get_mut(&node)?;
        state.calls += 1;
        let fault = state.fault.as_ref().map(|active| active.fault.clone());
        let expired = match state.fault.as_mut().and_then(|active| active.remaining.as_mut()) {
            Some(remaining) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            None => false,
        };
        if expired {
            state.fault = None;
        }
        Some((state.latency, fault))
    }

    fn read(&self, key: &Key, bins: &BinSelector) -> Option<Record> {
        let data = self.data.lock();
        let stored = data.get(key)?;
        let record = match bins {
            BinSelector::All => {
                Record::new(stored.bins.clone(), stored.generation, stored.expiration)
            }
            BinSelector::Named(names) => {
                let selected = names
                    .iter()
                    .filter_map(|name| {
                        let value = stored.bins.get(name)?;
                        Some((name.clone(), value.clone()))
                    })
                    .collect();
                Record::new(selected, stored.generation, stored.expiration)
            }
            BinSelector::Header => Record::header(stored.generation, stored.expiration),
        };
        Some(record)
    }
}

/// Tracks one in-flight sub-request; released on drop so aborted calls are
/// accounted for.
struct InFlight {
    counter: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Cluster for MemoryCluster {
    fn partition_replicas(&self, key: &Key) -> Vec<NodeInfo> {
        let partition = key.partition_id();
        if self.nodes.is_empty() || self.orphaned.lock().contains(&partition) {
            return Vec::new();
        }
        let start = partition as usize % self.nodes.len();
        (0..self.replication_factor)
            .map(|offset| self.nodes[(start + offset) % self.nodes.len()])
            .collect()
    }

    async fn send_batch(&self, node: NodeId, batch: NodeBatch) -> Result<Vec<BatchRow>, NodeError> {
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        let Some((latency, fault)) = self.begin_call(node, &batch) else {
            return Err(NodeError::Unreachable {
                node,
                reason: "unknown node".to_string(),
            });
        };
        debug!(node, keys = batch.entries.len(), ?fault, "memory cluster received sub-request");

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match fault {
            Some(Fault::Down) => {
                return Err(NodeError::Unreachable {
                    node,
                    reason: "connection refused".to_string(),
                })
            }
            Some(Fault::Busy) => return Err(NodeError::ServerBusy { node }),
            Some(Fault::Hang) => std::future::pending::<()>().await,
            Some(Fault::Fatal(reason)) => return Err(NodeError::Fatal { node, reason }),
            Some(Fault::Silent) => return Ok(Vec::new()),
            None => {}
        }

        let rows = batch
            .entries
            .iter()
            .map(|entry| match self.read(&entry.key, &entry.bins) {
                Some(record) => BatchRow::found(entry.index, record),
                None => BatchRow::not_found(entry.index),
            })
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_rotate_over_nodes() {
        let cluster = MemoryCluster::with_nodes(3, 2);
        let key = Key::new("test", "demo", "k").unwrap();
        let replicas = cluster.partition_replicas(&key);
        assert_eq!(replicas.len(), 2);
        let master = (key.partition_id() as u64 % 3) + 1;
        assert_eq!(replicas[0].id, master);
        assert_eq!(replicas[1].id, master % 3 + 1);
    }

    #[test]
    fn replication_factor_is_clamped() {
        let cluster = MemoryCluster::with_nodes(2, 5);
        let key = Key::new("test", "demo", "k").unwrap();
        assert_eq!(cluster.partition_replicas(&key).len(), 2);
    }

    #[test]
    fn orphaned_partitions_have_no_replicas() {
        let cluster = MemoryCluster::with_nodes(3, 2);
        let key = Key::new("test", "demo", "k").unwrap();
        cluster.orphan_partition(key.partition_id());
        assert!(cluster.partition_replicas(&key).is_empty());
    }

    #[test]
    fn puts_bump_the_generation() {
        let cluster = MemoryCluster::with_nodes(1, 1);
        let key = Key::new("test", "demo", "k").unwrap();
        cluster.put(&key, [Bin::new("b", "v1")]);
        cluster.put(&key, [Bin::new("b", "v2")]);
        let record = cluster.read(&key, &BinSelector::All).unwrap();
        assert_eq!(record.generation(), 2);
        assert_eq!(record.get("b"), Some(&Value::from("v2")));
    }

    #[test]
    fn selectors_project_bins() {
        let cluster = MemoryCluster::with_nodes(1, 1);
        let key = Key::new("test", "demo", "k").unwrap();
        cluster.put(&key, [Bin::new("a", 1i64), Bin::new("b", 2i64)]);

        let named = cluster.read(&key, &BinSelector::named(["b", "missing"])).unwrap();
        assert_eq!(named.bins().len(), 1);
        assert_eq!(named.get("b"), Some(&Value::Int(2)));

        let header = cluster.read(&key, &BinSelector::Header).unwrap();
        assert!(header.bins().is_empty());
        assert_eq!(header.generation(), 1);
    }

    #[tokio::test]
    async fn transient_faults_clear_after_their_calls() {
        let cluster = MemoryCluster::with_nodes(1, 1);
        cluster.set_fault_for(1, Fault::Busy, 1);
        let batch = NodeBatch {
            entries: Vec::new(),
            timeout: None,
        };

        let first = cluster.send_batch(1, batch.clone()).await;
        assert_eq!(first, Err(NodeError::ServerBusy { node: 1 }));
        let second = cluster.send_batch(1, batch).await;
        assert_eq!(second, Ok(Vec::new()));
        assert_eq!(cluster.calls(1), 2);
    }

    #[tokio::test]
    async fn unknown_nodes_are_unreachable() {
        let cluster = MemoryCluster::with_nodes(1, 1);
        let batch = NodeBatch {
            entries: Vec::new(),
            timeout: None,
        };
        let result = cluster.send_batch(9, batch).await;
        assert!(matches!(result, Err(NodeError::Unreachable { node: 9, .. })));
    }
}
