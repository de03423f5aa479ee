//! ormcache Engine - Cache Interception
//!
//! Sits between a persistence layer and a key-value [`Store`]. Point lookups
//! are served from the store when possible; misses are coalesced so that
//! concurrent callers trigger a single real fetch; writes refresh or evict
//! the affected entry.
//!
//! The persistence layer integrates by installing [`CachePlugin`] into its
//! [`Callbacks`] registry and driving operations through
//! [`Callbacks::query`] and [`Callbacks::write`].
//!
//! [`Store`]: ormcache_storage::Store

pub mod dedup;
pub mod hooks;
pub mod interceptor;
pub mod key;
pub mod operation;
pub mod plugin;
pub mod resolver;

pub use dedup::{DedupGroup, DedupOutcome};
pub use hooks::{
    query_hook, stage_hook, Callbacks, DataSink, DataSource, HookPoint, Plugin, QueryHook,
    StageHook,
};
pub use interceptor::CacheInterceptor;
pub use key::{CacheKey, KeyFormat};
pub use operation::{
    BypassReason, Operation, OperationKind, OperationState, QueryOutcome, WriteOutcome,
};
pub use plugin::{CachePlugin, PLUGIN_NAME};
pub use resolver::{PointLookup, Resolver};

// Re-export the types callers need alongside the engine
pub use ormcache_core::{
    CacheConfig, CacheError, CacheResult, CacheableEntity, FieldValue, FilterExpr, Schema, Ttl,
};
pub use ormcache_storage::{Cached, MemoryStore, Payload, RemoteStore, Store, StoreExt};
