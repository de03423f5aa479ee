//! ormcache Test Utilities
//!
//! Shared test infrastructure for the ormcache workspace:
//! - Sample entities implementing [`CacheableEntity`]
//! - [`MemoryTable`], an in-memory persistence layer with call counters
//! - Proptest generators (`generators` feature, on by default)
//! - Fixtures wiring the cache plugin over a memory store

// Re-export core types for convenience
pub use ormcache_core::{
    CacheConfig, CacheError, CacheResult, CacheableEntity, FieldValue, FilterExpr,
    FilterOperator, Schema, StoreError, Ttl,
};
pub use ormcache_engine::{
    CacheInterceptor, CachePlugin, Callbacks, DataSink, DataSource, Operation, OperationKind,
    QueryOutcome, WriteOutcome,
};
pub use ormcache_storage::{Cached, MemoryStore, Payload, Store, StoreExt};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

// ============================================================================
// SAMPLE ENTITIES
// ============================================================================

/// Plain entity relying on every default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub customer: String,
    pub total: u64,
}

impl Order {
    pub fn new(id: u64, total: u64) -> Self {
        Self {
            id,
            customer: "acme".to_string(),
            total,
        }
    }
}

impl CacheableEntity for Order {
    fn field_value(&self, field: &str) -> Option<FieldValue> {
        match field {
            "id" => Some(self.id.into()),
            "customer" => Some(self.customer.as_str().into()),
            "total" => Some(self.total.into()),
            _ => None,
        }
    }

    fn to_payload(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Entity with a string key and its own write-through configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub sku: String,
    pub price: u64,
}

impl Product {
    pub const KEY_PREFIX: &'static str = "catalog";

    pub fn new(sku: impl Into<String>, price: u64) -> Self {
        Self {
            sku: sku.into(),
            price,
        }
    }
}

impl CacheableEntity for Product {
    fn field_value(&self, field: &str) -> Option<FieldValue> {
        match field {
            "sku" => Some(self.sku.as_str().into()),
            "price" => Some(self.price.into()),
            _ => None,
        }
    }

    fn to_payload(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn cache_config(&self) -> Option<CacheConfig> {
        Some(
            CacheConfig::new()
                .with_prefix(Self::KEY_PREFIX)
                .with_write_cache(true)
                .with_ttl(Duration::from_secs(600)),
        )
    }
}

/// Entity whose optional capabilities are chosen per test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tunable {
    pub id: u64,
    pub config: Option<CacheConfig>,
    pub enabled: Option<bool>,
    pub disabled: Option<bool>,
    pub key: Option<String>,
}

impl Tunable {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = Some(disabled);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl CacheableEntity for Tunable {
    fn field_value(&self, field: &str) -> Option<FieldValue> {
        (field == "id").then(|| self.id.into())
    }

    fn to_payload(&self) -> Result<Value, serde_json::Error> {
        Ok(serde_json::json!({ "id": self.id }))
    }

    fn cache_config(&self) -> Option<CacheConfig> {
        self.config.clone()
    }

    fn cache_enabled(&self) -> Option<bool> {
        self.enabled
    }

    fn cache_disabled(&self) -> Option<bool> {
        self.disabled
    }

    fn cache_key(&self) -> Option<String> {
        self.key.clone()
    }
}

pub fn order_schema() -> Arc<Schema> {
    Arc::new(Schema::new("Order").with_primary_field("id"))
}

pub fn product_schema() -> Arc<Schema> {
    Arc::new(Schema::new("products").with_primary_field("sku"))
}

pub fn tunable_schema() -> Arc<Schema> {
    Arc::new(Schema::new("tunables").with_primary_field("id"))
}

// ============================================================================
// MEMORY TABLE
// ============================================================================

/// In-memory stand-in for a database table.
///
/// Rows are JSON objects keyed by their primary-key string. Every call to
/// [`DataSource::fetch`] and [`DataSink::execute`] is counted.
#[derive(Debug)]
pub struct MemoryTable {
    schema: Arc<Schema>,
    rows: RwLock<BTreeMap<String, Value>>,
    fetches: AtomicUsize,
    executes: AtomicUsize,
    fetch_delay: Option<Duration>,
    failing: AtomicBool,
}

impl MemoryTable {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            rows: RwLock::new(BTreeMap::new()),
            fetches: AtomicUsize::new(0),
            executes: AtomicUsize::new(0),
            fetch_delay: None,
            failing: AtomicBool::new(false),
        }
    }

    /// Make every fetch take at least `delay`.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Insert a row directly, bypassing counters and hooks.
    pub fn seed(&self, entity: &dyn CacheableEntity) -> CacheResult<()> {
        let key = self.row_key(entity);
        let payload = entity.to_payload().map_err(CacheError::source)?;
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, payload);
        Ok(())
    }

    pub fn row(&self, primary_key: &str) -> Option<Value> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(primary_key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn execute_count(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    /// Make subsequent fetches fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn row_key(&self, entity: &dyn CacheableEntity) -> String {
        self.schema
            .primary_fields
            .iter()
            .filter_map(|field| entity.field_value(field))
            .filter(|value| !value.is_zero())
            .map(|value| value.to_string())
            .collect::<Vec<_>>()
            .join("_")
    }
}

fn matches(row: &Value, clause: &FilterExpr) -> bool {
    let Some(actual) = row.get(&clause.field) else {
        return false;
    };
    let numeric = |cmp: fn(f64, f64) -> bool| match (actual.as_f64(), clause.value.as_f64()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    };
    match clause.operator {
        FilterOperator::Eq => *actual == clause.value,
        FilterOperator::Ne => *actual != clause.value,
        FilterOperator::In => clause
            .value
            .as_array()
            .is_some_and(|values| values.contains(actual)),
        FilterOperator::Contains => match (actual.as_str(), clause.value.as_str()) {
            (Some(a), Some(b)) => a.contains(b),
            _ => false,
        },
        FilterOperator::Gt => numeric(|a, b| a > b),
        FilterOperator::Lt => numeric(|a, b| a < b),
        FilterOperator::Gte => numeric(|a, b| a >= b),
        FilterOperator::Lte => numeric(|a, b| a <= b),
    }
}

#[async_trait]
impl DataSource for MemoryTable {
    async fn fetch(&self, op: &Operation) -> CacheResult<Vec<Value>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::source("table unavailable"));
        }

        let rows = self
            .rows
            .read()
            .map_err(|_| CacheError::source("table lock poisoned"))?;
        Ok(rows
            .values()
            .filter(|row| op.clauses.iter().all(|clause| matches(row, clause)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DataSink for MemoryTable {
    async fn execute(&self, op: &Operation) -> CacheResult<u64> {
        self.executes.fetch_add(1, Ordering::SeqCst);

        // Writes without a loaded key touch nothing.
        let Some(model) = op.model() else {
            return Ok(0);
        };
        let key = self.row_key(model);
        if key.is_empty() {
            return Ok(0);
        }

        let mut rows = self
            .rows
            .write()
            .map_err(|_| CacheError::source("table lock poisoned"))?;
        let affected = match op.kind {
            OperationKind::Create => {
                let payload = model.to_payload().map_err(CacheError::source)?;
                rows.insert(key, payload);
                true
            }
            OperationKind::Update => match rows.get_mut(&key) {
                Some(row) => {
                    *row = model.to_payload().map_err(CacheError::source)?;
                    true
                }
                None => false,
            },
            OperationKind::Delete => rows.remove(&key).is_some(),
            OperationKind::Query => false,
        };
        Ok(u64::from(affected))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

#[cfg(feature = "generators")]
pub mod generators {
    //! Proptest strategies for ormcache types.

    use super::*;
    use proptest::prelude::*;

    /// Table names, including the characters the default key format
    /// reserves (`:`, `_` and `%`).
    pub fn arb_table_name() -> impl Strategy<Value = String> {
        "[A-Za-z_:%][A-Za-z0-9_:%]{0,15}"
    }

    /// A primary-key value that is never the zero value of its type.
    pub fn arb_primary_value() -> impl Strategy<Value = FieldValue> {
        prop_oneof![
            (1u64..).prop_map(FieldValue::UInt),
            (i64::MIN..0i64).prop_map(FieldValue::Int),
            "[a-z0-9_:%]{1,12}".prop_map(FieldValue::Str),
        ]
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-wired cache pipelines for common scenarios.

    use super::*;

    /// A hook registry with the cache plugin installed over a memory store.
    pub struct Harness {
        pub callbacks: Callbacks,
        pub interceptor: Arc<CacheInterceptor>,
        pub store: Arc<MemoryStore>,
    }

    impl Harness {
        pub fn new(config: CacheConfig) -> Self {
            let store = Arc::new(MemoryStore::new());
            let interceptor = Arc::new(CacheInterceptor::new(
                Arc::clone(&store) as Arc<dyn Store>,
                config,
            ));
            let mut callbacks = Callbacks::new();
            callbacks
                .use_plugin(&CachePlugin::new(Arc::clone(&interceptor)))
                .expect("install cache plugin");
            Self {
                callbacks,
                interceptor,
                store,
            }
        }

        /// Default configuration with the `prefix` key prefix.
        pub fn with_prefix() -> Self {
            Self::new(CacheConfig::new().with_prefix("prefix"))
        }

        /// Run a point lookup through the pipeline.
        pub async fn find(
            &self,
            table: &MemoryTable,
            primary_key: Value,
        ) -> (CacheResult<QueryOutcome>, Operation) {
            self.find_with(table, primary_key, None).await
        }

        /// Run a point lookup carrying a model template, the way a typed
        /// query names its destination entity.
        pub async fn find_with(
            &self,
            table: &MemoryTable,
            primary_key: Value,
            template: Option<Arc<dyn CacheableEntity>>,
        ) -> (CacheResult<QueryOutcome>, Operation) {
            let field = table
                .schema()
                .single_primary_field()
                .unwrap_or_default()
                .to_string();
            let mut op = Operation::query(Arc::clone(table.schema()))
                .with_clause(FilterExpr::in_list(field, vec![primary_key]));
            op.model = template;
            let outcome = self.callbacks.query(&mut op, table).await;
            (outcome, op)
        }

        /// Run a write through the pipeline.
        pub async fn write(
            &self,
            table: &MemoryTable,
            kind: OperationKind,
            model: Arc<dyn CacheableEntity>,
        ) -> (CacheResult<u64>, Operation) {
            let mut op = Operation::new(kind, Arc::clone(table.schema())).with_model(model);
            let rows = self.callbacks.write(&mut op, table).await;
            (rows, op)
        }
    }

    /// The order used by the end-to-end scenario.
    pub fn order_seven() -> Order {
        Order::new(7, 42)
    }
}

// ============================================================================
// TESTS
// ============================================================================
