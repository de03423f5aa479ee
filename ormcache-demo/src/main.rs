//! ormcache walkthrough
//!
//! Installs the cache plugin over a memory store and an in-memory table,
//! then runs create, read, update, direct get and delete for one product,
//! logging what the cache did at each step.
//!
//! Environment:
//! - `RUST_LOG`: log filter (default `info,ormcache=debug`)
//! - `ORMCACHE_LOG_FORMAT`: `json` for JSON log lines
//! - `ORMCACHE_CONFIG`: path to a TOML cache configuration; falls back to
//!   the `ORMCACHE_*` variables read by `CacheConfig::from_env`

use std::sync::Arc;

use ormcache_core::{
    CacheConfig, CacheError, CacheResult, CacheableEntity, ConfigError, FieldValue, FilterExpr,
    Schema,
};
use ormcache_engine::{CacheInterceptor, CachePlugin, Callbacks, Operation};
use ormcache_storage::{Cached, MemoryStore, Store};
use ormcache_test_utils::MemoryTable;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Product {
    id: u64,
    code: String,
    price: u64,
}

impl CacheableEntity for Product {
    fn field_value(&self, field: &str) -> Option<FieldValue> {
        match field {
            "id" => Some(self.id.into()),
            "code" => Some(self.code.as_str().into()),
            "price" => Some(self.price.into()),
            _ => None,
        }
    }

    fn to_payload(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn cache_enabled(&self) -> Option<bool> {
        Some(true)
    }
}

#[tokio::main]
async fn main() -> CacheResult<()> {
    init_logging()?;

    // Write-through, so the direct get below finds the created row.
    let config = load_config()?.with_write_cache(true);
    tracing::info!(
        key_prefix = %config.key_prefix,
        read_cache = config.enable_read_cache,
        write_cache = config.enable_write_cache,
        ttl_ms = config.ttl.as_millis(),
        "cache configuration loaded"
    );

    let store = Arc::new(MemoryStore::new());
    let interceptor = Arc::new(CacheInterceptor::new(
        Arc::clone(&store) as Arc<dyn Store>,
        config,
    ));
    let mut callbacks = Callbacks::new();
    callbacks.use_plugin(&CachePlugin::new(Arc::clone(&interceptor)))?;

    let schema = Arc::new(Schema::new("products").with_primary_field("id"));
    let table = MemoryTable::new(Arc::clone(&schema));

    // Create: write-through stores the new row.
    let product = Product {
        id: 1,
        code: "Create".to_string(),
        price: 100,
    };
    let mut create = Operation::create(Arc::clone(&schema), Arc::new(product.clone()));
    let rows = callbacks.write(&mut create, &table).await?;
    tracing::info!(rows, "created product");

    // Read: answered from the cache, the table is never queried.
    let mut read = Operation::query(Arc::clone(&schema))
        .with_clause(FilterExpr::in_list("id", vec![json!(1)]))
        .with_model(Arc::new(Product::default()));
    let outcome = callbacks.query(&mut read, &table).await?;
    let found: Option<Product> = read
        .dest
        .first()
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(CacheError::source)?;
    tracing::info!(
        hit = outcome.is_hit(),
        table_fetches = table.fetch_count(),
        product = ?found,
        "read product"
    );

    // Update: the cached row follows the new code.
    let updated = Product {
        code: "Update".to_string(),
        ..found.unwrap_or(product)
    };
    let mut update = Operation::update(Arc::clone(&schema), Arc::new(updated));
    let rows = callbacks.write(&mut update, &table).await?;
    tracing::info!(rows, "updated product");

    // Direct get, outside the hook pipeline.
    match interceptor.get::<Product>("products", 1u64).await {
        Ok(Cached::Row(cached)) => tracing::info!(product = ?cached, "direct get"),
        Ok(Cached::Absent) => tracing::info!("direct get found the absent marker"),
        Err(e) => tracing::info!(error = %e, "direct get missed"),
    }

    // Delete: the entry becomes the absent marker.
    let mut delete = Operation::delete(
        Arc::clone(&schema),
        Arc::new(Product {
            id: 1,
            ..Product::default()
        }),
    );
    let rows = callbacks.write(&mut delete, &table).await?;
    let after = interceptor.get::<Product>("products", 1u64).await;
    tracing::info!(
        rows,
        absent = matches!(after, Ok(Cached::Absent)),
        "deleted product"
    );

    let stats = store.stats().await?;
    tracing::info!(
        hits = stats.hits,
        misses = stats.misses,
        sets = stats.sets,
        deletes = stats.deletes,
        hit_rate = stats.hit_rate(),
        "store statistics"
    );

    Ok(())
}

fn init_logging() -> CacheResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ormcache=debug"));
    let json = std::env::var("ORMCACHE_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| {
        CacheError::Config(ConfigError::Parse {
            reason: format!("failed to init subscriber: {}", e),
        })
    })
}

fn load_config() -> CacheResult<CacheConfig> {
    let Ok(path) = std::env::var("ORMCACHE_CONFIG") else {
        let config = CacheConfig::from_env();
        config.validate()?;
        return Ok(config);
    };

    let source = std::fs::read_to_string(&path).map_err(|e| {
        CacheError::Config(ConfigError::Parse {
            reason: format!("failed to read {}: {}", path, e),
        })
    })?;
    CacheConfig::from_toml_str(&source)
}
