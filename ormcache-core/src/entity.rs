//! Entity capabilities consumed by the cache layer.
//!
//! Every method except [`CacheableEntity::field_value`] and
//! [`CacheableEntity::to_payload`] is an optional capability. The defaults
//! mean "not implemented", which makes the engine fall back to its own
//! configuration and enablement rules.

use crate::CacheConfig;

/// An entity instance crossing into the cache layer.
///
/// Implemented by the persistence layer's model types. The trait is object
/// safe so that operations can carry `Arc<dyn CacheableEntity>`.
///
/// # Example
///
/// ```ignore
/// impl CacheableEntity for Order {
///     fn field_value(&self, field: &str) -> Option<FieldValue> {
///         match field {
///             "id" => Some(self.id.into()),
///             _ => None,
///         }
///     }
///
///     fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
///         serde_json::to_value(self)
///     }
///
///     fn cache_config(&self) -> Option<CacheConfig> {
///         Some(CacheConfig::new().with_write_cache(true))
///     }
/// }
/// ```
pub trait CacheableEntity: Send + Sync {
    /// Current value of a column, `None` if the entity has no such column.
    fn field_value(&self, field: &str) -> Option<crate::FieldValue>;

    /// Opaque payload stored in the cache for this entity.
    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Custom cache configuration for this entity type.
    fn cache_config(&self) -> Option<CacheConfig> {
        None
    }

    /// Explicit enable. When implemented, its answer wins unconditionally.
    fn cache_enabled(&self) -> Option<bool> {
        None
    }

    /// Explicit disable. Consulted only when [`Self::cache_enabled`] is not
    /// implemented.
    fn cache_disabled(&self) -> Option<bool> {
        None
    }

    /// Custom primary-key string replacing the one derived from
    /// primary-key fields. Ignored when empty.
    fn cache_key(&self) -> Option<String> {
        None
    }
}
