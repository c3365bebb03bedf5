//! Batch request and result types.
//!
//! A [`BatchReadRequest`] is an ordered list of keys with a bin selector
//! each. The matching [`BatchReadResult`] always holds exactly one
//! [`BatchRecord`] per request entry, at the same position, whatever
//! happened on the network.

use std::fmt;

use crate::error::BatchError;
use crate::key::Key;
use crate::record::Record;

/// Longest bin name the store accepts.
pub const MAX_BIN_NAME_LEN: usize = 15;

/// Which part of a record to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinSelector {
    All,
    Named(Vec<String>),
    /// Generation and expiration only.
    Header,
}

impl BinSelector {
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BinSelector::Named(names.into_iter().map(Into::into).collect())
    }

    fn validate(&self) -> Result<(), String> {
        let BinSelector::Named(names) = self else {
            return Ok(());
        };
        if names.is_empty() {
            return Err("named bin selector lists no bins".to_string());
        }
        for name in names {
            if name.is_empty() {
                return Err("bin name must not be empty".to_string());
            }
            if name.len() > MAX_BIN_NAME_LEN {
                return Err(format!("bin name {name:?} exceeds {MAX_BIN_NAME_LEN} bytes"));
            }
        }
        Ok(())
    }
}

/// One entry of a batch read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRead {
    pub key: Key,
    pub bins: BinSelector,
}

impl BatchRead {
    pub fn new(key: Key, bins: BinSelector) -> Self {
        Self { key, bins }
    }

    pub fn all(key: Key) -> Self {
        Self::new(key, BinSelector::All)
    }

    pub fn header(key: Key) -> Self {
        Self::new(key, BinSelector::Header)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReadRequest {
    entries: Vec<BatchRead>,
}

impl BatchReadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: BatchRead) {
        self.entries.push(entry);
    }

    pub fn with(mut self, key: Key, bins: BinSelector) -> Self {
        self.push(BatchRead::new(key, bins));
        self
    }

    pub fn entries(&self) -> &[BatchRead] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn validate(&self) -> Result<(), BatchError> {
        for (index, entry) in self.entries.iter().enumerate() {
            entry
                .bins
                .validate()
                .map_err(|reason| {
                    BatchError::MalformedRequest(format!("entry {index} ({}): {reason}", entry.key))
                })?;
        }
        Ok(())
    }
}

impl FromIterator<BatchRead> for BatchReadRequest {
    fn from_iter<I: IntoIterator<Item = BatchRead>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Per-key outcome of a batch read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok,
    KeyNotFound,
    Timeout,
    NodeError,
}

impl ResultCode {
    /// The store gave a definitive answer for the key.
    pub fn is_resolved(self) -> bool {
        matches!(self, ResultCode::Ok | ResultCode::KeyNotFound)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResultCode::Ok => "OK",
            ResultCode::KeyNotFound => "KEY_NOT_FOUND",
            ResultCode::Timeout => "TIMEOUT",
            ResultCode::NodeError => "NODE_ERROR",
        })
    }
}

/// Result slot for one request entry.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    key: Key,
    record: Option<Record>,
    status: ResultCode,
}

impl BatchRecord {
    pub(crate) fn found(key: Key, record: Record) -> Self {
        Self {
            key,
            record: Some(record),
            status: ResultCode::Ok,
        }
    }

    pub(crate) fn failed(key: Key, status: ResultCode) -> Self {
        debug_assert_ne!(status, ResultCode::Ok);
        Self {
            key,
            record: None,
            status,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The record, present only when the status is [`ResultCode::Ok`].
    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn status(&self) -> ResultCode {
        self.status
    }
}

/// Ordered per-key results of a batch read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReadResult {
    records: Vec<BatchRecord>,
}

impl BatchReadResult {
    pub(crate) fn new(records: Vec<BatchRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[BatchRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&BatchRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BatchRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn statuses(&self) -> Vec<ResultCode> {
        self.records.iter().map(BatchRecord::status).collect()
    }

    /// True when some entries failed (timeout or node error) while others
    /// received a definitive answer.
    pub fn is_partial(&self) -> bool {
        let summary = self.summary();
        summary.failed() > 0 && summary.resolved() > 0
    }

    pub fn summary(&self) -> OutcomeSummary {
        let mut summary = OutcomeSummary::default();
        for record in &self.records {
            match record.status {
                ResultCode::Ok => summary.ok += 1,
                ResultCode::KeyNotFound => summary.not_found += 1,
                ResultCode::Timeout => summary.timeout += 1,
                ResultCode::NodeError => summary.node_error += 1,
            }
        }
        summary
    }
}

impl<'a> IntoIterator for &'a BatchReadResult {
    type Item = &'a BatchRecord;
    type IntoIter = std::slice::Iter<'a, BatchRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Count of entries per [`ResultCode`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeSummary {
    pub ok: usize,
    pub not_found: usize,
    pub timeout: usize,
    pub node_error: usize,
}

impl OutcomeSummary {
    pub fn resolved(&self) -> usize {
        self.ok + self.not_found
    }

    pub fn failed(&self) -> usize {
        self.timeout + self.node_error
    }
}

impl fmt::Display for OutcomeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ok={} not_found={} timeout={} node_error={}",
            self.ok, self.not_found, self.timeout, self.node_error
        )
    }
}
