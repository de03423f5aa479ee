//! ormcache Core - Shared Types
//!
//! Pure data structures used by every other ormcache crate: errors, cache
//! configuration, schema descriptors, filter clauses and the entity
//! capability trait. No I/O lives here.

pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod schema;

pub use config::{CacheConfig, Ttl, DEFAULT_KEY_PREFIX};
pub use entity::CacheableEntity;
pub use error::{CacheError, CacheResult, ConfigError, StoreError};
pub use filter::{FilterExpr, FilterOperator};
pub use schema::{FieldValue, Schema};
