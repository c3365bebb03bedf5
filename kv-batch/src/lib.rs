//! Batch reads against a partitioned, replicated key-value cluster.
//!
//! A caller hands the executor an ordered list of keys, each with a bin
//! selector, plus a [`BatchPolicy`]. The executor routes every key to a
//! replica of its partition, fans out one sub-request per node, retries and
//! fails over according to the policy, and returns one result slot per key
//! in the order the keys were given.
//!
//! # Failure model
//!
//! The call only fails when it cannot start: a bad policy or a malformed
//! request. Everything that goes wrong on the network (slow nodes, refused
//! connections, busy servers, the total deadline) ends up in the per-key
//! [`ResultCode`]. A successful call therefore does not mean every key was
//! found; inspect each [`BatchRecord`].
//!
//! # Modules
//!
//! - [`key`], [`value`], [`record`]: identifiers, bin values, read results
//! - [`policy`]: timeouts, retries, concurrency, replica strategy
//! - [`routing`]: replica candidate ordering per strategy and attempt
//! - [`cluster`]: the routing/transport capability the executor consumes
//! - [`executor`]: fan-out, retry, and reassembly
//! - [`batch`]: request and result types, outcome classification
//! - [`validate`]: expected-versus-received bin checks
//! - [`memory`]: an in-process [`Cluster`] with fault injection

pub mod batch;
pub mod cluster;
pub mod error;
pub mod executor;
pub mod key;
pub mod memory;
pub mod policy;
pub mod record;
pub mod routing;
pub mod validate;
pub mod value;

pub use batch::{
    BatchRead, BatchReadRequest, BatchReadResult, BatchRecord, BinSelector, OutcomeSummary,
    ResultCode,
};
pub use cluster::{BatchRow, Cluster, KeyOutcome, NodeBatch, NodeBatchEntry, NodeId, NodeInfo};
pub use error::{BatchError, NodeError};
pub use executor::BatchExecutor;
pub use key::{Key, UserKey};
pub use policy::{BatchPolicy, Replica};
pub use record::Record;
pub use validate::{validate_batch, BinCheck};
pub use value::{Bin, MapKey, Value};
