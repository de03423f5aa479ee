//! Per-key coalescing of concurrent fetches.
//!
//! [`DedupGroup::run`] guarantees at most one in-flight execution of the
//! fetch function per key. Callers arriving while a fetch is running wait
//! for it and receive a clone of its result, error included.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ormcache_core::CacheResult;
use tokio::sync::OnceCell;

/// One in-flight fetch.
struct Call<V> {
    cell: OnceCell<CacheResult<V>>,
    waiters: AtomicUsize,
}

impl<V> Call<V> {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            waiters: AtomicUsize::new(0),
        }
    }
}

/// Result of [`DedupGroup::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct DedupOutcome<V> {
    /// The fetch result, shared by every caller of the flight.
    pub value: CacheResult<V>,
    /// Whether this caller executed the fetch.
    pub leader: bool,
    /// Whether more than one caller joined the flight.
    pub shared: bool,
}

/// Coalesces concurrent fetches by key.
pub struct DedupGroup<V> {
    calls: Mutex<HashMap<String, Arc<Call<V>>>>,
}

impl<V> Default for DedupGroup<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> DedupGroup<V> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys with a fetch in flight.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // The map only ever sees inserts and removals, so a panic elsewhere
    // cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Call<V>>>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn retire(&self, key: &str, call: &Arc<Call<V>>) {
        let mut calls = self.lock();
        if calls.get(key).is_some_and(|current| Arc::ptr_eq(current, call)) {
            calls.remove(key);
        }
    }
}

impl<V> DedupGroup<V>
where
    V: Clone + Send + Sync,
{
    /// Run `fetch` for `key` unless a fetch for `key` is already in flight,
    /// in which case wait for it and share its result.
    ///
    /// The entry is retired as soon as the fetch completes, so the next call
    /// after that starts a fresh flight.
    pub async fn run<F, Fut>(&self, key: &str, fetch: F) -> DedupOutcome<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<V>>,
    {
        let call = {
            let mut calls = self.lock();
            Arc::clone(
                calls
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Call::new())),
            )
        };
        call.waiters.fetch_add(1, Ordering::AcqRel);

        let mut leader = false;
        let flight = &call;
        let value = call
            .cell
            .get_or_init(|| {
                leader = true;
                async move {
                    let result = fetch().await;
                    self.retire(key, flight);
                    result
                }
            })
            .await
            .clone();

        DedupOutcome {
            value,
            leader,
            shared: call.waiters.load(Ordering::Acquire) > 1,
        }
    }
}
