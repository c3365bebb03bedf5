//! Batch read policy.
//!
//! A [`BatchPolicy`] is a plain value: build it once, validate it, and hand
//! it to the executor by reference. The executor never mutates it.
//!
//! Policies can also be loaded from JSON. Durations are written as integer
//! milliseconds and every field is optional:
//!
//! ```json
//! { "total_timeout": 1000, "socket_timeout": 100, "max_retries": 3, "replica": "SEQUENCE" }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BatchError;

/// Which replica serves a key on each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Replica {
    /// Always the partition master.
    Master,
    /// Master first, then the next replica in partition order on each retry.
    #[default]
    Sequence,
    /// Replicas in the caller's rack first, then sequence order.
    PreferRack,
    /// Uniformly random replica, re-rolled on each retry.
    Random,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchPolicy {
    /// Deadline for the whole batch call. Zero means the budget is already
    /// spent and every entry times out without contacting the cluster.
    #[serde(with = "duration_ms")]
    pub total_timeout: Duration,
    /// Deadline for one node round trip. Zero disables the per-socket bound.
    #[serde(with = "duration_ms")]
    pub socket_timeout: Duration,
    /// Additional attempts per key after the first.
    pub max_retries: u32,
    /// Cap on in-flight sub-requests; 0 means one per node without a cap.
    pub max_concurrent_requests: usize,
    pub replica: Replica,
    /// Rack the caller runs in, used by [`Replica::PreferRack`].
    pub rack_id: Option<u32>,
    /// Delay before a retried sub-request is re-issued.
    #[serde(with = "duration_ms")]
    pub sleep_between_retries: Duration,
    /// Whether a socket timeout uses up one of the key's retries. When false
    /// timed-out keys are re-issued until `total_timeout` expires.
    pub timeout_consumes_retry: bool,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            total_timeout: Duration::from_millis(1000),
            socket_timeout: Duration::ZERO,
            max_retries: 2,
            max_concurrent_requests: 0,
            replica: Replica::Sequence,
            rack_id: None,
            sleep_between_retries: Duration::ZERO,
            timeout_consumes_retry: true,
        }
    }
}

impl BatchPolicy {
    /// Rejects contradictory settings.
    pub fn validate(&self) -> Result<(), BatchError> {
        if !self.socket_timeout.is_zero() && self.socket_timeout > self.total_timeout {
            return Err(BatchError::InvalidPolicy(format!(
                "socket_timeout {:?} exceeds total_timeout {:?}",
                self.socket_timeout, self.total_timeout
            )));
        }
        if self.sleep_between_retries > self.total_timeout {
            return Err(BatchError::InvalidPolicy(format!(
                "sleep_between_retries {:?} exceeds total_timeout {:?}",
                self.sleep_between_retries, self.total_timeout
            )));
        }
        Ok(())
    }

    /// Parses and validates a policy from JSON.
    pub fn from_json(json: &str) -> Result<Self, BatchError> {
        let policy: BatchPolicy =
            serde_json::from_str(json).map_err(|err| BatchError::InvalidPolicy(err.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Round-trip deadline for one sub-request, if bounded.
    pub(crate) fn round_trip_timeout(&self) -> Option<Duration> {
        (!self.socket_timeout.is_zero()).then_some(self.socket_timeout)
    }

    pub(crate) fn concurrency_limit(&self) -> Option<usize> {
        (self.max_concurrent_requests > 0).then_some(self.max_concurrent_requests)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
