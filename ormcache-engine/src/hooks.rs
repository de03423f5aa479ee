//! Lifecycle hook registry and the pipeline drivers around it.
//!
//! The persistence layer owns a [`Callbacks`] registry and drives every
//! operation through [`Callbacks::query`] or [`Callbacks::write`]. Plugins
//! register named handlers at the eight [`HookPoint`]s.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use ormcache_core::{CacheError, CacheResult, ConfigError};

use crate::operation::{BypassReason, Operation, OperationKind, OperationState, QueryOutcome};

/// Executes the real query.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Rows matching the operation's clauses.
    async fn fetch(&self, op: &Operation) -> CacheResult<Vec<serde_json::Value>>;
}

/// Executes the real create, update or delete.
#[async_trait]
pub trait DataSink: Send + Sync {
    /// Apply the write and return the number of affected rows.
    async fn execute(&self, op: &Operation) -> CacheResult<u64>;
}

/// Handler run before or after an operation.
pub type StageHook = Arc<dyn for<'a> Fn(&'a mut Operation) -> BoxFuture<'a, ()> + Send + Sync>;

/// Handler that replaces query execution.
pub type QueryHook = Arc<
    dyn for<'a> Fn(&'a mut Operation, &'a dyn DataSource) -> BoxFuture<'a, CacheResult<QueryOutcome>>
        + Send
        + Sync,
>;

/// Wrap a closure as a [`StageHook`].
pub fn stage_hook<F>(f: F) -> StageHook
where
    F: for<'a> Fn(&'a mut Operation) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`QueryHook`].
pub fn query_hook<F>(f: F) -> QueryHook
where
    F: for<'a> Fn(&'a mut Operation, &'a dyn DataSource) -> BoxFuture<'a, CacheResult<QueryOutcome>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Points in the operation lifecycle where handlers can be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeQuery,
    BeforeCreate,
    BeforeUpdate,
    BeforeDelete,
    /// Replaces query execution
    Query,
    AfterCreate,
    AfterUpdate,
    AfterDelete,
}

impl HookPoint {
    pub const ALL: [HookPoint; 8] = [
        HookPoint::BeforeQuery,
        HookPoint::BeforeCreate,
        HookPoint::BeforeUpdate,
        HookPoint::BeforeDelete,
        HookPoint::Query,
        HookPoint::AfterCreate,
        HookPoint::AfterUpdate,
        HookPoint::AfterDelete,
    ];

    pub fn before(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Query => HookPoint::BeforeQuery,
            OperationKind::Create => HookPoint::BeforeCreate,
            OperationKind::Update => HookPoint::BeforeUpdate,
            OperationKind::Delete => HookPoint::BeforeDelete,
        }
    }

    /// Post-operation point; queries have none.
    pub fn after(kind: OperationKind) -> Option<Self> {
        match kind {
            OperationKind::Query => None,
            OperationKind::Create => Some(HookPoint::AfterCreate),
            OperationKind::Update => Some(HookPoint::AfterUpdate),
            OperationKind::Delete => Some(HookPoint::AfterDelete),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::BeforeQuery => "before_query",
            HookPoint::BeforeCreate => "before_create",
            HookPoint::BeforeUpdate => "before_update",
            HookPoint::BeforeDelete => "before_delete",
            HookPoint::Query => "query",
            HookPoint::AfterCreate => "after_create",
            HookPoint::AfterUpdate => "after_update",
            HookPoint::AfterDelete => "after_delete",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that installs handlers into a [`Callbacks`] registry.
pub trait Plugin {
    fn name(&self) -> &str;

    fn initialize(&self, callbacks: &mut Callbacks) -> CacheResult<()>;
}

struct StageEntry {
    point: HookPoint,
    name: String,
    hook: StageHook,
}

/// Registry of lifecycle handlers.
#[derive(Default)]
pub struct Callbacks {
    stages: Vec<StageEntry>,
    query: Option<(String, QueryHook)>,
    plugins: Vec<String>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage handler. A handler already registered under the
    /// same name at the same point is replaced in place.
    pub fn register(
        &mut self,
        point: HookPoint,
        name: impl Into<String>,
        hook: StageHook,
    ) -> CacheResult<()> {
        if point == HookPoint::Query {
            return Err(ConfigError::InvalidValue {
                field: "point".to_string(),
                value: point.to_string(),
                reason: "use replace_query for the query stage".to_string(),
            }
            .into());
        }

        let name = name.into();
        match self
            .stages
            .iter_mut()
            .find(|entry| entry.point == point && entry.name == name)
        {
            Some(entry) => entry.hook = hook,
            None => self.stages.push(StageEntry { point, name, hook }),
        }
        Ok(())
    }

    /// Install the query-replacement handler, replacing any previous one.
    pub fn replace_query(&mut self, name: impl Into<String>, hook: QueryHook) {
        self.query = Some((name.into(), hook));
    }

    /// Run a plugin's `initialize` once; later calls with the same name are
    /// ignored.
    pub fn use_plugin(&mut self, plugin: &dyn Plugin) -> CacheResult<()> {
        if self.plugins.iter().any(|name| name == plugin.name()) {
            return Ok(());
        }
        plugin.initialize(self)?;
        self.plugins.push(plugin.name().to_string());
        Ok(())
    }

    /// Names registered at `point`, in run order.
    pub fn names(&self, point: HookPoint) -> Vec<&str> {
        if point == HookPoint::Query {
            return self.query.iter().map(|(name, _)| name.as_str()).collect();
        }
        self.stages
            .iter()
            .filter(|entry| entry.point == point)
            .map(|entry| entry.name.as_str())
            .collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.stages.iter().any(|entry| entry.name == name)
            || self.query.as_ref().is_some_and(|(n, _)| n == name)
    }

    async fn run_stage(&self, point: HookPoint, op: &mut Operation) {
        for entry in self.stages.iter().filter(|entry| entry.point == point) {
            (entry.hook)(&mut *op).await;
        }
    }

    /// Drive a query: before handlers, then the replacement handler (or the
    /// data source when none is registered).
    ///
    /// Only a data-source failure is returned as an error.
    pub async fn query(
        &self,
        op: &mut Operation,
        source: &dyn DataSource,
    ) -> CacheResult<QueryOutcome> {
        expect_kind(op, |kind| kind == OperationKind::Query)?;

        self.run_stage(HookPoint::BeforeQuery, op).await;

        let outcome = match &self.query {
            Some((_, hook)) => hook(&mut *op, source).await?,
            None => {
                op.dest = source.fetch(op).await?;
                op.state = OperationState::Bypassed;
                QueryOutcome::Bypassed(BypassReason::NoCacheHook)
            }
        };

        op.rows_affected = op.dest.len() as u64;
        op.state = OperationState::Completed;
        Ok(outcome)
    }

    /// Drive a write: before handlers, the data sink, then the after handlers
    /// when the sink succeeded.
    pub async fn write(&self, op: &mut Operation, sink: &dyn DataSink) -> CacheResult<u64> {
        expect_kind(op, |kind| kind.is_write())?;

        self.run_stage(HookPoint::before(op.kind), op).await;

        let rows = sink.execute(op).await?;
        op.rows_affected = rows;

        if let Some(point) = HookPoint::after(op.kind) {
            self.run_stage(point, op).await;
        }

        op.state = OperationState::Completed;
        Ok(rows)
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<String> = self
            .stages
            .iter()
            .map(|entry| format!("{}:{}", entry.point, entry.name))
            .collect();
        f.debug_struct("Callbacks")
            .field("stages", &stages)
            .field("query", &self.query.as_ref().map(|(name, _)| name))
            .field("plugins", &self.plugins)
            .finish()
    }
}

fn expect_kind(op: &Operation, accepts: impl Fn(OperationKind) -> bool) -> CacheResult<()> {
    if accepts(op.kind) {
        Ok(())
    } else {
        Err(CacheError::Config(ConfigError::InvalidValue {
            field: "kind".to_string(),
            value: op.kind.to_string(),
            reason: "operation kind does not match the pipeline".to_string(),
        }))
    }
}
