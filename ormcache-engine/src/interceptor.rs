//! The cache decision engine.
//!
//! [`CacheInterceptor`] holds the store, the resolver and the dedup group,
//! and implements the three stages the hooks call into:
//!
//! - [`CacheInterceptor::before`]: resolve and attach configuration
//! - [`CacheInterceptor::query`]: serve point lookups from the store, or
//!   fetch once per key and populate it
//! - [`CacheInterceptor::after_write`]: refresh or evict after a write
//!
//! Store failures never fail the data-access operation. The only way the
//! cache alters what the caller sees is a hit, which skips the real query.

use std::sync::Arc;

use ormcache_core::{CacheConfig, CacheError, CacheResult, FieldValue, StoreError};
use ormcache_storage::{Cached, Payload, Store, StoreExt};
use serde::de::DeserializeOwned;

use crate::dedup::DedupGroup;
use crate::hooks::DataSource;
use crate::key::{CacheKey, KeyFormat};
use crate::operation::{
    BypassReason, Operation, OperationKind, OperationState, QueryOutcome, WriteOutcome,
};
use crate::resolver::{PointLookup, Resolver};

/// Read-through / write-through cache engine.
///
/// # Example
///
/// ```ignore
/// let interceptor = CacheInterceptor::new(Arc::new(MemoryStore::new()), CacheConfig::default());
///
/// let mut op = Operation::query(schema).with_clause(FilterExpr::in_list("id", vec![json!(7)]));
/// interceptor.before(&mut op);
/// let outcome = interceptor.query(&mut op, &table).await?;
/// ```
pub struct CacheInterceptor {
    store: Arc<dyn Store>,
    resolver: Resolver,
    group: DedupGroup<Vec<serde_json::Value>>,
}

impl CacheInterceptor {
    /// Create an engine with the default key format.
    pub fn new(store: Arc<dyn Store>, default_config: CacheConfig) -> Self {
        Self::with_format(store, default_config, KeyFormat::default())
    }

    pub fn with_format(
        store: Arc<dyn Store>,
        default_config: CacheConfig,
        format: KeyFormat,
    ) -> Self {
        Self {
            store,
            resolver: Resolver::new(default_config, format),
            group: DedupGroup::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Number of keys with a fetch in flight.
    pub fn in_flight(&self) -> usize {
        self.group.len()
    }

    /// Pre-operation stage: resolve the configuration once and attach it.
    pub fn before(&self, op: &mut Operation) {
        let config = self.resolver.resolve_config(op.model());
        op.config = Some(config);
        op.state = OperationState::ConfigResolved;
    }

    fn config_for(&self, op: &Operation) -> Arc<CacheConfig> {
        op.config
            .clone()
            .unwrap_or_else(|| self.resolver.resolve_config(op.model()))
    }

    /// Query stage.
    ///
    /// Fills `op.dest` either from the store or from `source`. Only a
    /// failure of `source` is returned as an error.
    pub async fn query(
        &self,
        op: &mut Operation,
        source: &dyn DataSource,
    ) -> CacheResult<QueryOutcome> {
        let config = self.config_for(op);
        op.config = Some(Arc::clone(&config));

        let key = match self.plan_lookup(op, &config) {
            Ok(key) => key,
            Err(reason) => return self.bypass(op, source, reason).await,
        };

        match self.store.get(key.as_str()).await {
            Ok(payload) => {
                tracing::debug!(key = %key, op = "query", "cache hit");
                op.dest = match payload {
                    Payload::Row(row) => vec![row],
                    Payload::Absent => Vec::new(),
                };
                op.state = OperationState::CacheHit;
                return Ok(QueryOutcome::Hit);
            }
            Err(StoreError::NotFound { .. }) => {
                tracing::debug!(key = %key, op = "query", "cache miss");
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, falling back to source");
            }
        }

        let outcome = {
            let op: &Operation = op;
            let store = &self.store;
            let key = &key;
            let ttl = config.ttl;
            self.group
                .run(key.as_str(), || async move {
                    let rows = source.fetch(op).await?;
                    if let Some(row) = rows.first() {
                        if let Err(e) = store.set(key.as_str(), Payload::Row(row.clone()), ttl).await {
                            tracing::warn!(key = %key, error = %e, "cache populate failed");
                        } else {
                            tracing::debug!(key = %key, "cache populated");
                        }
                    }
                    Ok(rows)
                })
                .await
        };

        op.dest = outcome.value?;
        op.state = if outcome.leader {
            OperationState::CacheMissLeader
        } else {
            OperationState::CacheMissFollower
        };
        Ok(QueryOutcome::Fetched {
            leader: outcome.leader,
        })
    }

    /// Decide whether the query can be answered by key, and which key.
    fn plan_lookup(&self, op: &Operation, config: &CacheConfig) -> Result<CacheKey, BypassReason> {
        if !self.resolver.is_enabled(op.model(), true) {
            return Err(BypassReason::Disabled);
        }
        if !config.enable_read_cache {
            return Err(BypassReason::ReadCacheOff);
        }
        let value = match self.resolver.detect_point_lookup(&op.schema, &op.clauses) {
            PointLookup::Key(value) => value,
            PointLookup::Skip => return Err(BypassReason::NotPointLookup),
        };
        if self.resolver.overrides_key(op.model()) {
            return Err(BypassReason::CustomKey);
        }
        self.resolver
            .lookup_key(config, op.table(), &value)
            .map_err(|e| {
                tracing::debug!(table = %op.table(), error = %e, "no cache key for lookup");
                BypassReason::KeyNotFound
            })
    }

    async fn bypass(
        &self,
        op: &mut Operation,
        source: &dyn DataSource,
        reason: BypassReason,
    ) -> CacheResult<QueryOutcome> {
        op.dest = source.fetch(op).await?;
        op.state = OperationState::Bypassed;
        Ok(QueryOutcome::Bypassed(reason))
    }

    /// Post-write stage for create, update and delete.
    ///
    /// Never fails: every problem is logged and reported in the outcome.
    pub async fn after_write(&self, op: &Operation) -> WriteOutcome {
        let config = self.config_for(op);

        if !self.resolver.is_enabled(op.model(), op.rows_affected > 0) {
            return WriteOutcome::Disabled;
        }

        let key = match self.resolver.entity_key(&config, &op.schema, op.model()) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(table = %op.table(), op = %op.kind, error = %e, "skipping cache update");
                return WriteOutcome::KeyNotFound;
            }
        };

        if !config.enable_write_cache {
            return match self.store.del(key.as_str()).await {
                Ok(()) => {
                    tracing::debug!(key = %key, op = %op.kind, "cache evicted");
                    WriteOutcome::Evicted
                }
                Err(e) => {
                    tracing::warn!(key = %key, op = %op.kind, error = %e, "cache evict failed");
                    WriteOutcome::StoreFailed
                }
            };
        }

        let sentinel = op.kind == OperationKind::Delete;
        let payload = match self.write_payload(op, &key, sentinel) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key = %key, op = %op.kind, error = %e, "cache refresh failed");
                return WriteOutcome::StoreFailed;
            }
        };

        match self.store.set(key.as_str(), payload, config.ttl).await {
            Ok(()) => {
                tracing::debug!(key = %key, op = %op.kind, sentinel, "cache refreshed");
                WriteOutcome::Refreshed { sentinel }
            }
            Err(e) => {
                tracing::warn!(key = %key, op = %op.kind, error = %e, "cache refresh failed");
                WriteOutcome::StoreFailed
            }
        }
    }

    fn write_payload(
        &self,
        op: &Operation,
        key: &CacheKey,
        sentinel: bool,
    ) -> Result<Payload, StoreError> {
        if sentinel {
            return Ok(Payload::Absent);
        }
        let encode_error = |reason: String| StoreError::Encode {
            key: key.to_string(),
            reason,
        };
        let model = op
            .model()
            .ok_or_else(|| encode_error("operation has no model".to_string()))?;
        model
            .to_payload()
            .map(Payload::Row)
            .map_err(|e| encode_error(e.to_string()))
    }

    /// Read a cached row directly, outside the hook pipeline.
    ///
    /// Uses the default configuration's prefix. A missing key is
    /// `CacheError::Store(StoreError::NotFound)`.
    pub async fn get<T>(&self, table: &str, primary_key: impl Into<FieldValue>) -> CacheResult<Cached<T>>
    where
        T: DeserializeOwned + Send,
    {
        let primary_key: FieldValue = primary_key.into();
        let key = self
            .resolver
            .lookup_key(self.resolver.default_config(), table, &primary_key)?;
        self.store
            .get_as::<T>(key.as_str())
            .await
            .map_err(CacheError::from)
    }
}

impl std::fmt::Debug for CacheInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInterceptor")
            .field("resolver", &self.resolver)
            .field("in_flight", &self.group.len())
            .finish()
    }
}
