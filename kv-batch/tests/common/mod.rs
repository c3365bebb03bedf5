//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Result, bail};
use kv_batch::memory::MemoryCluster;
use kv_batch::{BatchExecutor, Bin, Cluster, Key, NodeId};

pub const NAMESPACE: &str = "test";
pub const SET: &str = "demo";

pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// An in-memory cluster plus an executor bound to it.
pub struct TestCluster {
    pub cluster: Arc<MemoryCluster>,
    pub executor: BatchExecutor,
}

impl TestCluster {
    /// `nodes` nodes, every partition replicated `replication_factor` times.
    pub fn spawn(nodes: u64, replication_factor: usize) -> Self {
        Self::from_cluster(MemoryCluster::with_nodes(nodes, replication_factor))
    }

    pub fn from_cluster(cluster: MemoryCluster) -> Self {
        init_tracing();
        let cluster = Arc::new(cluster);
        let executor = BatchExecutor::with_seed(cluster.clone(), 7);
        Self { cluster, executor }
    }

    pub fn put(&self, key: &Key, bins: Vec<Bin>) {
        self.cluster.put(key, bins);
    }

    /// The node currently serving as master for `key`.
    pub fn master_of(&self, key: &Key) -> NodeId {
        self.cluster.partition_replicas(key)[0].id
    }

    /// First `count` keys named `{prefix}{n}` whose partition is mastered by
    /// `node`.
    pub fn keys_mastered_by(&self, node: NodeId, prefix: &str, count: usize) -> Result<Vec<Key>> {
        let mut keys = Vec::with_capacity(count);
        for n in 0..10_000 {
            if keys.len() == count {
                return Ok(keys);
            }
            let key = key(&format!("{prefix}{n}"))?;
            if self.master_of(&key) == node {
                keys.push(key);
            }
        }
        if keys.len() == count {
            return Ok(keys);
        }
        bail!("could not find {count} keys mastered by node {node}")
    }
}

pub fn key(user_key: &str) -> Result<Key> {
    Ok(Key::new(NAMESPACE, SET, user_key)?)
}
