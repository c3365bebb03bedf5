//! Records returned by successful reads.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::value::{Bin, Value};

/// Seconds between the Unix epoch and the store epoch (2010-01-01T00:00:00Z).
/// Record expirations are expressed relative to the store epoch.
pub const STORE_EPOCH_OFFSET: u64 = 1_262_304_000;

/// Bins plus metadata for one key, as read from the cluster.
///
/// Records are only created from read results and are never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    bins: HashMap<String, Value>,
    generation: u32,
    expiration: u32,
}

impl Record {
    pub fn new(bins: HashMap<String, Value>, generation: u32, expiration: u32) -> Self {
        Self {
            bins,
            generation,
            expiration,
        }
    }

    /// A record that carries only generation and expiration.
    pub fn header(generation: u32, expiration: u32) -> Self {
        Self::new(HashMap::new(), generation, expiration)
    }

    pub fn from_bins<I>(bins: I, generation: u32, expiration: u32) -> Self
    where
        I: IntoIterator<Item = Bin>,
    {
        let bins = bins.into_iter().map(|bin| (bin.name, bin.value)).collect();
        Self::new(bins, generation, expiration)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bins.get(name)
    }

    pub fn bins(&self) -> &HashMap<String, Value> {
        &self.bins
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Expiration in seconds since the store epoch; 0 means never.
    pub fn expiration(&self) -> u32 {
        self.expiration
    }

    /// Remaining time to live, or `None` when the record never expires.
    /// An already-expired record reports a zero duration.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_at(SystemTime::now())
    }

    fn ttl_at(&self, now: SystemTime) -> Option<Duration> {
        if self.expiration == 0 {
            return None;
        }
        let expires_at =
            UNIX_EPOCH + Duration::from_secs(STORE_EPOCH_OFFSET + self.expiration as u64);
        Some(expires_at.duration_since(now).unwrap_or(Duration::ZERO))
    }
}
