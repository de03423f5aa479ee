//! Store trait and usage statistics.
//!
//! This module defines the capability every cache backend implements and
//! the typed helpers layered on top of it.

use async_trait::async_trait;
use ormcache_core::{StoreError, Ttl};
use serde::de::DeserializeOwned;

use crate::entry::{Cached, Payload};

/// Key-value store with per-entry expiration.
///
/// Implementations must be safe under arbitrary concurrent use. A read of an
/// expired entry must behave exactly like a read of a missing key.
///
/// # TTL
///
/// - [`Ttl::Never`]: the entry never expires
/// - [`Ttl::Default`]: the backend's default lifetime
/// - [`Ttl::After`]: expires once the duration has elapsed
#[async_trait]
pub trait Store: Send + Sync {
    /// Get the payload stored under `key`.
    ///
    /// Returns [`StoreError::NotFound`] for missing and expired keys.
    async fn get(&self, key: &str) -> Result<Payload, StoreError>;

    /// Store `payload` under `key`, replacing any previous entry.
    async fn set(&self, key: &str, payload: Payload, ttl: Ttl) -> Result<(), StoreError>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Get store statistics.
    async fn stats(&self) -> Result<CacheStats, StoreError>;
}

/// Typed helpers for any [`Store`].
#[async_trait]
pub trait StoreExt: Store {
    /// Get and decode the value under `key`.
    ///
    /// A stored row that does not fit `T` is a [`StoreError::TypeMismatch`],
    /// never a miss.
    async fn get_as<T>(&self, key: &str) -> Result<Cached<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        self.get(key).await?.decode(key)
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

/// Statistics about store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of reads that found a live entry.
    pub hits: u64,
    /// Number of reads that found nothing (including expired entries).
    pub misses: u64,
    /// Number of entries currently held, when the backend can tell.
    pub entry_count: u64,
    /// Number of successful writes.
    pub sets: u64,
    /// Number of successful deletes.
    pub deletes: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
