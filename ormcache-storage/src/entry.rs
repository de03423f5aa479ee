//! Cached payloads and table entries.

use ormcache_core::StoreError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Instant;

/// What a store holds under a key.
///
/// `Absent` is the confirmed-absent sentinel written after deletes. It is a
/// real entry, distinct from the key not being present at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// A cached row
    Row(serde_json::Value),
    /// The row is known not to exist
    Absent,
}

impl Payload {
    /// Whether this is the confirmed-absent sentinel.
    pub fn is_absent(&self) -> bool {
        matches!(self, Payload::Absent)
    }

    /// Decode into a typed destination.
    ///
    /// Fails with [`StoreError::TypeMismatch`] when the stored row does not
    /// have the shape `T` expects.
    pub fn decode<T: DeserializeOwned>(self, key: &str) -> Result<Cached<T>, StoreError> {
        match self {
            Payload::Absent => Ok(Cached::Absent),
            Payload::Row(value) => serde_json::from_value(value)
                .map(Cached::Row)
                .map_err(|e| StoreError::TypeMismatch {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
        }
    }
}

/// A typed read result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cached<T> {
    /// The cached row, decoded
    Row(T),
    /// The confirmed-absent sentinel
    Absent,
}

impl<T> Cached<T> {
    /// The row, if this is not the sentinel.
    pub fn into_row(self) -> Option<T> {
        match self {
            Cached::Row(row) => Some(row),
            Cached::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Cached::Absent)
    }
}

/// One slot in an in-process table.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Payload,
    /// `None` means the entry never expires.
    pub expire_at: Option<Instant>,
}

impl CacheEntry {
    pub fn new(payload: Payload, expire_at: Option<Instant>) -> Self {
        Self { payload, expire_at }
    }

    /// Whether the entry is dead at `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expire_at.is_some_and(|at| at <= now)
    }
}
