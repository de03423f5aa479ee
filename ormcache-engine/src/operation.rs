//! Per-operation context handed to every hook.

use std::fmt;
use std::sync::Arc;

use ormcache_core::{CacheConfig, CacheableEntity, FilterExpr, Schema};

/// The four kinds of data-access operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, OperationKind::Query)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an operation is in the cache state machine.
///
/// `Pending → ConfigResolved → {CacheHit | CacheMissLeader |
/// CacheMissFollower | Bypassed} → Completed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationState {
    #[default]
    Pending,
    ConfigResolved,
    /// Satisfied from the store; the real query did not run
    CacheHit,
    /// This caller ran the real query
    CacheMissLeader,
    /// Another caller ran the real query and shared its rows
    CacheMissFollower,
    /// The cache was not consulted
    Bypassed,
    Completed,
}

/// One data-access operation as seen by the hooks.
///
/// `dest` is the caller's destination buffer: query stages fill it, write
/// stages leave it alone.
#[derive(Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub schema: Arc<Schema>,
    /// Entity the operation targets, if the persistence layer has one loaded
    pub model: Option<Arc<dyn CacheableEntity>>,
    pub clauses: Vec<FilterExpr>,
    pub rows_affected: u64,
    pub dest: Vec<serde_json::Value>,
    /// Configuration attached by the pre-operation stage
    pub config: Option<Arc<CacheConfig>>,
    pub state: OperationState,
}

impl Operation {
    pub fn new(kind: OperationKind, schema: Arc<Schema>) -> Self {
        Self {
            kind,
            schema,
            model: None,
            clauses: Vec::new(),
            rows_affected: 0,
            dest: Vec::new(),
            config: None,
            state: OperationState::Pending,
        }
    }

    pub fn query(schema: Arc<Schema>) -> Self {
        Self::new(OperationKind::Query, schema)
    }

    pub fn create(schema: Arc<Schema>, model: Arc<dyn CacheableEntity>) -> Self {
        Self::new(OperationKind::Create, schema).with_model(model)
    }

    pub fn update(schema: Arc<Schema>, model: Arc<dyn CacheableEntity>) -> Self {
        Self::new(OperationKind::Update, schema).with_model(model)
    }

    pub fn delete(schema: Arc<Schema>, model: Arc<dyn CacheableEntity>) -> Self {
        Self::new(OperationKind::Delete, schema).with_model(model)
    }

    pub fn with_model(mut self, model: Arc<dyn CacheableEntity>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_clause(mut self, clause: FilterExpr) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn table(&self) -> &str {
        &self.schema.table
    }

    pub fn model(&self) -> Option<&dyn CacheableEntity> {
        self.model.as_deref()
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("kind", &self.kind)
            .field("table", &self.schema.table)
            .field("has_model", &self.model.is_some())
            .field("clauses", &self.clauses)
            .field("rows_affected", &self.rows_affected)
            .field("dest", &self.dest.len())
            .field("state", &self.state)
            .finish()
    }
}

/// Why a query ran without consulting the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    /// The entity opted out
    Disabled,
    /// Read-through caching is off in the resolved configuration
    ReadCacheOff,
    /// The filter is not a primary-key point lookup
    NotPointLookup,
    /// No usable key could be derived
    KeyNotFound,
    /// The query's model supplies its own cache key
    CustomKey,
    /// No query-replacement hook is registered
    NoCacheHook,
}

/// How the query stage satisfied a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Served from the store; the real query was skipped
    Hit,
    /// The real query ran behind the dedup group
    Fetched { leader: bool },
    /// The real query ran unmodified
    Bypassed(BypassReason),
}

impl QueryOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, QueryOutcome::Hit)
    }
}

/// What the post-write stage did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The entry was rewritten; `sentinel` for deletes
    Refreshed { sentinel: bool },
    /// The entry was removed
    Evicted,
    /// Caching is not enabled for this write
    Disabled,
    /// No usable key could be derived; nothing was touched
    KeyNotFound,
    /// The store failed; the failure was logged
    StoreFailed,
}
