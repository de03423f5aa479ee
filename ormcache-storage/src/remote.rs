//! Remote key-value adapter.
//!
//! [`RemoteStore`] maps the [`Store`] contract onto any networked key-value
//! service reachable through a [`KvClient`]. Payloads travel as JSON bytes.
//! Client failures are surfaced verbatim as [`StoreError::Backend`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ormcache_core::{StoreError, Ttl};

use crate::entry::Payload;
use crate::traits::{CacheStats, Store};

/// Error type returned by [`KvClient`] implementations.
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

const BACKEND: &str = "remote";

/// Minimal client surface a remote service must offer.
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Raw bytes under `key`, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ClientError>;

    /// Store bytes, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>)
        -> Result<(), ClientError>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn del(&self, key: &str) -> Result<(), ClientError>;
}

/// [`Store`] backed by a remote key-value service.
pub struct RemoteStore<C> {
    client: C,
    default_ttl: Ttl,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl<C: KvClient> RemoteStore<C> {
    /// Wrap a client. Entries written with [`Ttl::Default`] never expire.
    pub fn new(client: C) -> Self {
        Self::with_default_ttl(client, Ttl::Never)
    }

    pub fn with_default_ttl(client: C, default_ttl: Ttl) -> Self {
        Self {
            client,
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// The wrapped client.
    pub fn client(&self) -> &C {
        &self.client
    }
}

fn backend_error(err: ClientError) -> StoreError {
    StoreError::Backend {
        backend: BACKEND.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl<C: KvClient> Store for RemoteStore<C> {
    async fn get(&self, key: &str) -> Result<Payload, StoreError> {
        let bytes = self.client.get(key).await.map_err(backend_error)?;

        let Some(bytes) = bytes else {
            tracing::debug!(key = %key, "remote miss");
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        };

        let payload: Payload =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::TypeMismatch {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(key = %key, absent = payload.is_absent(), "remote hit");
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(payload)
    }

    async fn set(&self, key: &str, payload: Payload, ttl: Ttl) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&payload).map_err(|e| StoreError::Encode {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let lifetime = ttl.resolve(self.default_ttl);

        self.client
            .set(key, bytes, lifetime)
            .await
            .map_err(backend_error)?;

        tracing::debug!(key = %key, ttl_ms = ?lifetime.map(|d| d.as_millis()), "remote set");
        self.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.client.del(key).await.map_err(backend_error)?;

        tracing::debug!(key = %key, "remote del");
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, StoreError> {
        // The remote side owns the key space; entry_count is not tracked.
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: 0,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }
}

#[cfg(feature = "redis")]
mod redis_client {
    use super::{ClientError, KvClient};
    use async_trait::async_trait;
    use redis::aio::ConnectionManager;
    use redis::AsyncCommands;
    use std::time::Duration;

    #[async_trait]
    impl KvClient for ConnectionManager {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ClientError> {
            let mut conn = self.clone();
            let value: Option<Vec<u8>> = AsyncCommands::get(&mut conn, key).await?;
            Ok(value)
        }

        async fn set(
            &self,
            key: &str,
            value: Vec<u8>,
            ttl: Option<Duration>,
        ) -> Result<(), ClientError> {
            let mut conn = self.clone();
            match ttl {
                Some(ttl) => {
                    // PSETEX rejects zero; round sub-millisecond lifetimes up.
                    let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
                    conn.pset_ex::<_, _, ()>(key, value, millis).await?
                }
                None => AsyncCommands::set::<_, _, ()>(&mut conn, key, value).await?,
            }
            Ok(())
        }

        async fn del(&self, key: &str) -> Result<(), ClientError> {
            let mut conn = self.clone();
            AsyncCommands::del::<_, ()>(&mut conn, key).await?;
            Ok(())
        }
    }
}
