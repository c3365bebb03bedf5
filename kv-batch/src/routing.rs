//! Replica selection.
//!
//! For every attempt the executor resolves the key's candidate list and
//! indexes into it with the attempt number. `Random` reshuffles on every
//! resolution, so each attempt is an independent uniform pick. Failover is therefore a pure
//! function of (replica list, strategy, attempt); nothing in the cluster is
//! mutated to move on to the next replica.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::cluster::{Cluster, NodeId, NodeInfo};
use crate::key::Key;
use crate::policy::{BatchPolicy, Replica};

/// Orders `replicas` (master first) according to the policy's strategy.
///
/// `Random` yields a fresh shuffle on every call.
pub fn candidates<R: Rng>(
    replicas: &[NodeInfo],
    policy: &BatchPolicy,
    rng: &mut R,
) -> Vec<NodeId> {
    match policy.replica {
        Replica::Master => replicas.first().map(|node| node.id).into_iter().collect(),
        Replica::Sequence => replicas.iter().map(|node| node.id).collect(),
        Replica::PreferRack => match policy.rack_id {
            Some(rack) => {
                let (local, remote): (Vec<&NodeInfo>, Vec<&NodeInfo>) =
                    replicas.iter().partition(|node| node.rack == Some(rack));
                local.into_iter().chain(remote).map(|node| node.id).collect()
            }
            None => replicas.iter().map(|node| node.id).collect(),
        },
        Replica::Random => {
            let mut ids: Vec<NodeId> = replicas.iter().map(|node| node.id).collect();
            ids.shuffle(rng);
            ids
        }
    }
}

/// Strategy-aware candidate list for `key`, asking the cluster for the
/// partition's replicas.
pub fn resolve_replicas<R: Rng>(
    cluster: &dyn Cluster,
    key: &Key,
    policy: &BatchPolicy,
    rng: &mut R,
) -> Vec<NodeId> {
    candidates(&cluster.partition_replicas(key), policy, rng)
}

/// Node that should serve a key on its `attempt`-th dispatch (0-based),
/// wrapping around the candidate list; `None` when there are no candidates.
pub fn target_for_attempt(candidates: &[NodeId], attempt: u32) -> Option<NodeId> {
    if candidates.is_empty() {
        return None;
    }
    candidates.get(attempt as usize % candidates.len()).copied()
}
