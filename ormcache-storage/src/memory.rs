//! In-process expiring store.
//!
//! A single `RwLock` guards the whole table. Every operation is an O(1) map
//! access so the critical sections stay short.
//!
//! Expiration is lazy: an expired entry is evicted by the first `get` that
//! trips over it. [`MemoryStore::purge_expired`] sweeps the whole table on
//! demand; nothing runs in the background.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use async_trait::async_trait;
use ormcache_core::{StoreError, Ttl};

use crate::entry::{CacheEntry, Payload};
use crate::traits::{CacheStats, Store};

/// In-memory store, lost on restart.
///
/// # Example
///
/// ```ignore
/// let store = MemoryStore::new();
/// store.set("ormcache:orders:7", Payload::Row(json!({"id": 7})), Ttl::Never).await?;
/// let payload = store.get("ormcache:orders:7").await?;
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, CacheEntry>>,
    /// What [`Ttl::Default`] means for this store.
    default_ttl: Ttl,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store whose default TTL is "never expire".
    pub fn new() -> Self {
        Self::with_default_ttl(Ttl::Never)
    }

    /// Create an empty store with an explicit default TTL.
    pub fn with_default_ttl(default_ttl: Ttl) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Number of entries physically held, expired ones included.
    pub fn len(&self) -> usize {
        self.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is physically held, without expiry checks or eviction.
    pub fn contains_raw(&self, key: &str) -> bool {
        self.read()
            .map(|items| items.contains_key(key))
            .unwrap_or(false)
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut items = self.write()?;
        let before = items.len();
        items.retain(|_, entry| !entry.is_expired_at(now));
        Ok(before - items.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, CacheEntry>>, StoreError> {
        self.items.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, CacheEntry>>, StoreError> {
        self.items.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn hit(&self, payload: &Payload) -> Result<Payload, StoreError> {
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(payload.clone())
    }

    fn miss(&self, key: &str) -> Result<Payload, StoreError> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        Err(StoreError::NotFound {
            key: key.to_string(),
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Payload, StoreError> {
        let now = Instant::now();

        {
            let items = self.read()?;
            match items.get(key) {
                None => return self.miss(key),
                Some(entry) if !entry.is_expired_at(now) => return self.hit(&entry.payload),
                Some(_) => {}
            }
        }

        // Expired: evict under the write lock. Another caller may have
        // replaced the entry in between, so look again.
        let mut items = self.write()?;
        match items.get(key) {
            Some(entry) if !entry.is_expired_at(now) => self.hit(&entry.payload),
            Some(_) => {
                items.remove(key);
                self.miss(key)
            }
            None => self.miss(key),
        }
    }

    async fn set(&self, key: &str, payload: Payload, ttl: Ttl) -> Result<(), StoreError> {
        let now = Instant::now();
        // A lifetime too large for `Instant` is as good as forever.
        let expire_at = ttl
            .resolve(self.default_ttl)
            .and_then(|lifetime| now.checked_add(lifetime));
        let entry = CacheEntry::new(payload, expire_at);

        self.write()?.insert(key.to_string(), entry);
        self.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.write()?.remove(key);
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, StoreError> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.read()?.len() as u64,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Cached;
    use crate::traits::StoreExt;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u64,
        total: u64,
    }

    fn row(id: u64, total: u64) -> Payload {
        Payload::Row(json!({"id": id, "total": total}))
    }

    #[tokio::test]
    async fn test_set_then_get_roundtrip() {
        let store = MemoryStore::new();
        store
            .set("prefix:Order:7", row(7, 42), Ttl::After(Duration::from_secs(600)))
            .await
            .unwrap();

        let cached: Cached<Order> = store.get_as("prefix:Order:7").await.unwrap();
        assert_eq!(cached, Cached::Row(Order { id: 7, total: 42 }));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_found_and_evicted() {
        let store = MemoryStore::new();
        store
            .set("k", row(1, 1), Ttl::After(Duration::from_millis(1)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        // Still physically present until someone reads it.
        assert!(store.contains_raw("k"));

        let err = store.get("k").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::NotFound {
                key: "k".to_string()
            }
        );
        assert!(!store.contains_raw("k"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_never_expiring_entry() {
        let store = MemoryStore::new();
        store.set("k", row(1, 1), Ttl::Never).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.get("k").await.is_ok());
    }

    #[tokio::test]
    async fn test_default_ttl_never_expires_by_default() {
        let store = MemoryStore::new();
        store.set("k", row(1, 1), Ttl::Default).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.get("k").await.is_ok());
    }

    #[tokio::test]
    async fn test_default_ttl_uses_store_default() {
        let store = MemoryStore::with_default_ttl(Ttl::After(Duration::from_millis(1)));
        store.set("k", row(1, 1), Ttl::Default).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.get("k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_del_removes_entry() {
        let store = MemoryStore::new();
        store.set("k", row(1, 1), Ttl::Never).await.unwrap();
        store.del("k").await.unwrap();
        assert!(store.get("k").await.unwrap_err().is_not_found());

        // Deleting twice is fine.
        store.del("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_sentinel_is_distinct_from_missing() {
        let store = MemoryStore::new();
        store.set("k", Payload::Absent, Ttl::Never).await.unwrap();

        let payload = store.get("k").await.unwrap();
        assert!(payload.is_absent());

        let cached: Cached<Order> = store.get_as("k").await.unwrap();
        assert!(cached.is_absent());
    }

    #[tokio::test]
    async fn test_wrong_destination_is_type_mismatch() {
        let store = MemoryStore::new();
        store.set("k", row(1, 1), Ttl::Never).await.unwrap();

        let err = store.get_as::<Vec<String>>("k").await.unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store
            .set("short", row(1, 1), Ttl::After(Duration::from_millis(1)))
            .await
            .unwrap();
        store.set("long", row(2, 2), Ttl::Never).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.purge_expired().unwrap(), 1);
        assert!(!store.contains_raw("short"));
        assert!(store.contains_raw("long"));
    }

    #[tokio::test]
    async fn test_stats_track_operations() {
        let store = MemoryStore::new();
        store.set("k", row(1, 1), Ttl::Never).await.unwrap();
        let _ = store.get("k").await;
        let _ = store.get("k").await;
        let _ = store.get("missing").await;
        store.del("k").await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.entry_count, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_access_same_key() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();

        for i in 0..64u64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                match i % 3 {
                    0 => store.set("hot", row(i, i), Ttl::Never).await.map(|_| ()),
                    1 => match store.get("hot").await {
                        Ok(_) => Ok(()),
                        Err(e) if e.is_not_found() => Ok(()),
                        Err(e) => Err(e),
                    },
                    _ => store.del("hot").await,
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // The table is still usable and holds at most the one key.
        assert!(store.len() <= 1);
        store.set("hot", row(1, 1), Ttl::Never).await.unwrap();
        assert!(store.get("hot").await.is_ok());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Set(u8, u64),
        Del(u8),
    }

    fn arb_step() -> impl proptest::strategy::Strategy<Value = Step> {
        use proptest::prelude::*;
        prop_oneof![
            (0u8..4, any::<u64>()).prop_map(|(k, v)| Step::Set(k, v)),
            (0u8..4).prop_map(Step::Del),
        ]
    }

    proptest::proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        /// Any interleaving of sets and deletes leaves the store agreeing
        /// with a plain map.
        #[test]
        fn prop_matches_map_model(steps in proptest::collection::vec(arb_step(), 0..40)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let store = MemoryStore::new();
                let mut model = std::collections::HashMap::new();

                for step in &steps {
                    match *step {
                        Step::Set(k, v) => {
                            store.set(&format!("k{}", k), row(v, v), Ttl::Never).await.unwrap();
                            model.insert(k, v);
                        }
                        Step::Del(k) => {
                            store.del(&format!("k{}", k)).await.unwrap();
                            model.remove(&k);
                        }
                    }
                }

                assert_eq!(store.len(), model.len());
                for k in 0u8..4 {
                    let got = store.get(&format!("k{}", k)).await;
                    match model.get(&k) {
                        Some(&v) => assert_eq!(got.unwrap(), row(v, v)),
                        None => assert!(got.unwrap_err().is_not_found()),
                    }
                }
            });
        }
    }
}
