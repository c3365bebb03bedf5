//! Batch read execution.
//!
//! One call to [`BatchExecutor::execute_batch_read`] runs this loop:
//!
//! 1. Route every key to a node (see [`crate::routing`]) and group keys by
//!    node into jobs on a work queue.
//! 2. Launch jobs as tasks on a `JoinSet` while the number of in-flight
//!    sub-requests is below `max_concurrent_requests` (no cap when 0).
//! 3. Join tasks as they finish. Answers land in a slot vector indexed by
//!    request position. Keys of a sub-request that failed retriably are
//!    re-routed to their next candidate and queued again while they have
//!    retry budget left.
//! 4. Stop when nothing is queued or in flight, or when `total_timeout`
//!    expires. Expiry aborts outstanding tasks and marks every unresolved
//!    slot as TIMEOUT.
//!
//! Each slot is written at most once, so completion order never affects the
//! shape of the result.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, info, warn};

use crate::batch::{BatchReadRequest, BatchReadResult, BatchRecord, ResultCode};
use crate::cluster::{BatchRow, Cluster, KeyOutcome, NodeBatch, NodeBatchEntry, NodeId};
use crate::error::{BatchError, NodeError};
use crate::policy::BatchPolicy;
use crate::routing;

/// Executes batch reads against a shared cluster handle.
///
/// The executor itself is stateless apart from its random source, so one
/// instance can serve any number of concurrent calls.
pub struct BatchExecutor {
    cluster: Arc<dyn Cluster>,
    rng: Mutex<StdRng>,
}

impl BatchExecutor {
    pub fn new(cluster: Arc<dyn Cluster>) -> Self {
        Self {
            cluster,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Executor whose `Random` replica choices are reproducible.
    pub fn with_seed(cluster: Arc<dyn Cluster>, seed: u64) -> Self {
        Self {
            cluster,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Reads every entry of `request` and returns one result slot per
    /// entry, in request order.
    ///
    /// Fails only when the policy or the request is invalid, before any
    /// network activity. Timeouts and node failures are reported per entry.
    pub async fn execute_batch_read(
        &self,
        request: &BatchReadRequest,
        policy: &BatchPolicy,
    ) -> Result<BatchReadResult, BatchError> {
        policy.validate()?;
        request.validate()?;

        if request.is_empty() {
            debug!("empty batch request, nothing to dispatch");
            return Ok(BatchReadResult::default());
        }

        let rng = StdRng::seed_from_u64(self.rng.lock().gen());
        let mut dispatch = Dispatch::new(request, policy, Arc::clone(&self.cluster), rng);

        if policy.total_timeout.is_zero() {
            warn!(keys = request.len(), "total timeout is zero, no key can be resolved");
            return Ok(dispatch.finish(ResultCode::Timeout));
        }

        dispatch.route((0..request.len()).collect(), Duration::ZERO);

        // `time::timeout` saturates deadlines past the clock's range.
        let fallback = match time::timeout(policy.total_timeout, dispatch.drive()).await {
            Ok(()) => ResultCode::NodeError,
            Err(_) => {
                warn!(
                    in_flight = dispatch.tasks.len(),
                    queued = dispatch.queue.len(),
                    total_timeout = ?policy.total_timeout,
                    "batch total timeout expired"
                );
                dispatch.tasks.abort_all();
                ResultCode::Timeout
            }
        };

        let result = dispatch.finish(fallback);
        let summary = result.summary();
        info!(
            keys = result.len(),
            %summary,
            partial = result.is_partial(),
            "batch read finished"
        );
        Ok(result)
    }
}

/// Keys bound for one node in one round trip.
struct Job {
    node: NodeId,
    indices: Vec<usize>,
    delay: Duration,
}

struct JobReport {
    node: NodeId,
    indices: Vec<usize>,
    result: Result<Vec<BatchRow>, NodeError>,
}

/// Mutable state of a single batch call.
struct Dispatch<'a> {
    request: &'a BatchReadRequest,
    policy: &'a BatchPolicy,
    cluster: Arc<dyn Cluster>,
    rng: StdRng,
    slots: Vec<Option<BatchRecord>>,
    /// Dispatches made per key; selects the replica for the next one.
    attempts: Vec<u32>,
    /// Retries charged per key.
    retries: Vec<u32>,
    queue: VecDeque<Job>,
    tasks: JoinSet<JobReport>,
}

impl<'a> Dispatch<'a> {
    fn new(
        request: &'a BatchReadRequest,
        policy: &'a BatchPolicy,
        cluster: Arc<dyn Cluster>,
        rng: StdRng,
    ) -> Self {
        let len = request.len();
        Self {
            request,
            policy,
            cluster,
            rng,
            slots: vec![None; len],
            attempts: vec![0; len],
            retries: vec![0; len],
            queue: VecDeque::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Groups unresolved keys by their next target node and queues one job
    /// per node.
    fn route(&mut self, indices: Vec<usize>, delay: Duration) {
        let request = self.request;
        let mut groups: BTreeMap<NodeId, Vec<usize>> = BTreeMap::new();
        for index in indices {
            if self.slots[index].is_some() {
                continue;
            }
            let key = &request.entries()[index].key;
            let candidates =
                routing::resolve_replicas(self.cluster.as_ref(), key, self.policy, &mut self.rng);
            match routing::target_for_attempt(&candidates, self.attempts[index]) {
                Some(node) => {
                    self.attempts[index] += 1;
                    groups.entry(node).or_default().push(index);
                }
                None => {
                    warn!(%key, "no replica known for partition {}", key.partition_id());
                    self.resolve(index, ResultCode::NodeError);
                }
            }
        }

        for (node, indices) in groups {
            debug!(node, keys = indices.len(), ?delay, "queued sub-request");
            self.queue.push_back(Job { node, indices, delay });
        }
    }

    /// Runs until no job is queued or in flight.
    async fn drive(&mut self) {
        loop {
            self.launch_ready();
            let Some(joined) = self.tasks.join_next().await else {
                break;
            };
            match joined {
                Ok(report) => self.absorb(report),
                Err(err) => warn!(error = %err, "sub-request task did not complete"),
            }
        }
    }

    fn launch_ready(&mut self) {
        while self
            .policy
            .concurrency_limit()
            .map_or(true, |limit| self.tasks.len() < limit)
        {
            let Some(job) = self.queue.pop_front() else {
                break;
            };
            self.spawn(job);
        }
    }

    fn spawn(&mut self, job: Job) {
        let Job { node, indices, delay } = job;
        let entries = indices
            .iter()
            .map(|&index| {
                let entry = &self.request.entries()[index];
                NodeBatchEntry {
                    index,
                    key: entry.key.clone(),
                    bins: entry.bins.clone(),
                }
            })
            .collect();
        let round_trip = self.policy.round_trip_timeout();
        let batch = NodeBatch {
            entries,
            timeout: round_trip,
        };
        let cluster = Arc::clone(&self.cluster);

        self.tasks.spawn(async move {
            if !delay.is_zero() {
                time::sleep(delay).await;
            }
            debug!(node, keys = indices.len(), "sending sub-request");
            let call = AssertUnwindSafe(cluster.send_batch(node, batch)).catch_unwind();
            let outcome = match round_trip {
                Some(limit) => time::timeout(limit, call)
                    .await
                    .unwrap_or(Ok(Err(NodeError::Timeout { node }))),
                None => call.await,
            };
            let result = outcome.unwrap_or_else(|_| {
                Err(NodeError::Fatal {
                    node,
                    reason: "sub-request panicked".to_string(),
                })
            });
            JobReport { node, indices, result }
        });
    }

    fn absorb(&mut self, report: JobReport) {
        let JobReport { node, indices, result } = report;
        match result {
            Ok(rows) => self.absorb_rows(node, &indices, rows),
            Err(err) if err.is_retriable() => self.retry_or_exhaust(&err, indices),
            Err(err) => {
                warn!(node, error = %err, keys = indices.len(), "sub-request failed permanently");
                for index in indices {
                    self.resolve(index, ResultCode::NodeError);
                }
            }
        }
    }

    fn absorb_rows(&mut self, node: NodeId, indices: &[usize], rows: Vec<BatchRow>) {
        let expected: HashSet<usize> = indices.iter().copied().collect();
        for row in rows {
            if !expected.contains(&row.index) {
                warn!(node, index = row.index, "discarding row for a key not in the sub-request");
                continue;
            }
            if self.slots[row.index].is_some() {
                warn!(node, index = row.index, "discarding duplicate row");
                continue;
            }
            let key = self.request.entries()[row.index].key.clone();
            self.slots[row.index] = Some(match row.outcome {
                KeyOutcome::Found(record) => BatchRecord::found(key, record),
                KeyOutcome::NotFound => BatchRecord::failed(key, ResultCode::KeyNotFound),
            });
        }

        let unanswered: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&index| self.slots[index].is_none())
            .collect();
        if !unanswered.is_empty() {
            warn!(node, keys = unanswered.len(), "node left keys unanswered");
            for index in unanswered {
                self.resolve(index, ResultCode::NodeError);
            }
        }
    }

    fn retry_or_exhaust(&mut self, err: &NodeError, indices: Vec<usize>) {
        let free = err.is_timeout() && !self.policy.timeout_consumes_retry;
        let exhausted_code = if err.is_timeout() {
            ResultCode::Timeout
        } else {
            ResultCode::NodeError
        };

        let mut retry = Vec::with_capacity(indices.len());
        let mut exhausted = 0usize;
        for index in indices {
            if self.slots[index].is_some() {
                continue;
            }
            if free {
                retry.push(index);
            } else if self.retries[index] < self.policy.max_retries {
                self.retries[index] += 1;
                retry.push(index);
            } else {
                exhausted += 1;
                self.resolve(index, exhausted_code);
            }
        }

        warn!(
            node = err.node(),
            error = %err,
            retrying = retry.len(),
            exhausted,
            "sub-request failed"
        );
        if !retry.is_empty() {
            self.route(retry, self.policy.sleep_between_retries);
        }
    }

    fn resolve(&mut self, index: usize, status: ResultCode) {
        if self.slots[index].is_none() {
            let key = self.request.entries()[index].key.clone();
            self.slots[index] = Some(BatchRecord::failed(key, status));
        }
    }

    /// Assembles the result in request order, giving `fallback` to every
    /// slot that was never resolved.
    fn finish(self, fallback: ResultCode) -> BatchReadResult {
        let records = self
            .slots
            .into_iter()
            .zip(self.request.entries())
            .map(|(slot, entry)| {
                slot.unwrap_or_else(|| BatchRecord::failed(entry.key.clone(), fallback))
            })
            .collect();
        BatchReadResult::new(records)
    }
}
