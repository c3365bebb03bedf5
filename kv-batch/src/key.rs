//! Record identifiers.
//!
//! A [`Key`] names one record: namespace, set, and the caller's user key.
//! Routing and identity use a fixed-size digest computed from the set name
//! and the user key, so arbitrarily large user keys route and compare at the
//! same cost. The user key itself is retained for display.

use std::fmt;
use std::hash::{Hash, Hasher};

use sha2::{Digest as _, Sha256};

use crate::error::BatchError;

/// Number of partitions the key space is sharded into.
pub const PARTITIONS: u16 = 4096;

/// Characters the store reserves as separators in namespace and set names.
const RESERVED: &[char] = &[':', ';', '\0'];

const MAX_NAMESPACE_LEN: usize = 31;
const MAX_SET_LEN: usize = 63;

pub type Digest = [u8; 32];

/// The caller-supplied part of a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserKey {
    Int(i64),
    String(String),
    Blob(Vec<u8>),
}

impl UserKey {
    fn type_tag(&self) -> u8 {
        match self {
            UserKey::Int(_) => 1,
            UserKey::String(_) => 3,
            UserKey::Blob(_) => 4,
        }
    }

    fn write_bytes(&self, hasher: &mut Sha256) {
        match self {
            UserKey::Int(v) => hasher.update(v.to_be_bytes()),
            UserKey::String(s) => hasher.update(s.as_bytes()),
            UserKey::Blob(b) => hasher.update(b),
        }
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserKey::Int(v) => write!(f, "{v}"),
            UserKey::String(s) => f.write_str(s),
            UserKey::Blob(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for UserKey {
    fn from(value: i64) -> Self {
        UserKey::Int(value)
    }
}

impl From<&str> for UserKey {
    fn from(value: &str) -> Self {
        UserKey::String(value.to_string())
    }
}

impl From<String> for UserKey {
    fn from(value: String) -> Self {
        UserKey::String(value)
    }
}

impl From<Vec<u8>> for UserKey {
    fn from(value: Vec<u8>) -> Self {
        UserKey::Blob(value)
    }
}

impl From<&[u8]> for UserKey {
    fn from(value: &[u8]) -> Self {
        UserKey::Blob(value.to_vec())
    }
}

/// Immutable record identifier.
///
/// Equality and hashing consider the namespace, the set, and the digest. Two
/// keys built from different user-key representations that hash to the same
/// digest are the same key.
#[derive(Debug, Clone)]
pub struct Key {
    namespace: String,
    set_name: String,
    user_key: UserKey,
    digest: Digest,
}

impl Key {
    /// Builds a key, rejecting empty, oversized, or separator-bearing
    /// namespace and set names.
    pub fn new(
        namespace: impl Into<String>,
        set_name: impl Into<String>,
        user_key: impl Into<UserKey>,
    ) -> Result<Self, BatchError> {
        let namespace = namespace.into();
        let set_name = set_name.into();
        validate_name("namespace", &namespace, MAX_NAMESPACE_LEN)?;
        validate_name("set", &set_name, MAX_SET_LEN)?;

        let user_key = user_key.into();
        let digest = compute_digest(&set_name, &user_key);
        Ok(Self {
            namespace,
            set_name,
            user_key,
            digest,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    pub fn user_key(&self) -> &UserKey {
        &self.user_key
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Partition owning this key, in `0..PARTITIONS`.
    pub fn partition_id(&self) -> u16 {
        u16::from_le_bytes([self.digest[0], self.digest[1]]) & (PARTITIONS - 1)
    }
}

fn validate_name(kind: &str, name: &str, max_len: usize) -> Result<(), BatchError> {
    if name.is_empty() {
        return Err(BatchError::InvalidIdentifier(format!("{kind} must not be empty")));
    }
    if name.len() > max_len {
        return Err(BatchError::InvalidIdentifier(format!(
            "{kind} {name:?} exceeds {max_len} bytes"
        )));
    }
    if let Some(c) = name.chars().find(|c| RESERVED.contains(c)) {
        return Err(BatchError::InvalidIdentifier(format!(
            "{kind} {name:?} contains reserved character {c:?}"
        )));
    }
    Ok(())
}

fn compute_digest(set_name: &str, user_key: &UserKey) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(set_name.as_bytes());
    hasher.update([user_key.type_tag()]);
    user_key.write_bytes(&mut hasher);
    hasher.finalize().into()
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
            && self.namespace == other.namespace
            && self.set_name == other.set_name
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.set_name.hash(state);
        self.digest.hash(state);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.set_name, self.user_key)
    }
}
