//! Key and configuration resolution.
//!
//! Given an entity and its schema, the [`Resolver`] decides which
//! configuration applies, whether caching is enabled, and under which key the
//! row lives. It also recognizes the single query shape that can be answered
//! by key.

use std::sync::Arc;

use ormcache_core::{
    CacheConfig, CacheError, CacheResult, CacheableEntity, FieldValue, FilterExpr,
    FilterOperator, Schema,
};

use crate::key::{CacheKey, KeyFormat};

/// Whether a query can be served by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointLookup {
    /// The query selects exactly this primary-key value
    Key(FieldValue),
    /// Any other shape; run the query normally
    Skip,
}

/// Resolves configuration, enablement and cache keys.
#[derive(Debug, Clone)]
pub struct Resolver {
    format: KeyFormat,
    default_config: Arc<CacheConfig>,
}

impl Resolver {
    pub fn new(default_config: CacheConfig, format: KeyFormat) -> Self {
        Self {
            format,
            default_config: Arc::new(default_config),
        }
    }

    pub fn format(&self) -> &KeyFormat {
        &self.format
    }

    /// Configuration used when an entity does not supply its own.
    pub fn default_config(&self) -> &Arc<CacheConfig> {
        &self.default_config
    }

    /// The entity's own configuration if it has one, else the default.
    pub fn resolve_config(&self, entity: Option<&dyn CacheableEntity>) -> Arc<CacheConfig> {
        entity
            .and_then(|e| e.cache_config())
            .map(Arc::new)
            .unwrap_or_else(|| Arc::clone(&self.default_config))
    }

    /// Apply the enablement rules.
    ///
    /// An explicit enable answer wins. Otherwise an explicit disable answer
    /// is inverted. Otherwise `default` applies.
    pub fn is_enabled(&self, entity: Option<&dyn CacheableEntity>, default: bool) -> bool {
        let Some(entity) = entity else {
            return default;
        };
        if let Some(enabled) = entity.cache_enabled() {
            return enabled;
        }
        if let Some(disabled) = entity.cache_disabled() {
            return !disabled;
        }
        default
    }

    /// Non-zero primary-key values in declaration order, escaped and joined.
    ///
    /// Empty when every primary-key field is zero or missing. Zero fields
    /// are skipped, so `(7, 0)` and `(0, 7)` in one table share a key.
    pub fn primary_key_string(&self, schema: &Schema, entity: &dyn CacheableEntity) -> String {
        let values = schema
            .primary_fields
            .iter()
            .filter_map(|field| entity.field_value(field))
            .filter(|value| !value.is_zero())
            .map(|value| value.to_string());
        self.format.join_values(values)
    }

    /// Build the key for `table` and an escaped primary-key string.
    ///
    /// An empty primary-key string is [`CacheError::KeyNotFound`]; nothing is
    /// ever cached under an ambiguous key.
    fn derive_key(
        &self,
        config: &CacheConfig,
        table: &str,
        primary_key: &str,
    ) -> CacheResult<CacheKey> {
        if primary_key.is_empty() {
            return Err(CacheError::KeyNotFound {
                table: table.to_string(),
            });
        }
        Ok(CacheKey::new(
            &self.format,
            &config.key_prefix,
            table,
            primary_key,
        ))
    }

    /// Key for an entity instance.
    ///
    /// A non-empty [`CacheableEntity::cache_key`] replaces the string built
    /// from primary-key fields.
    pub fn entity_key(
        &self,
        config: &CacheConfig,
        schema: &Schema,
        entity: Option<&dyn CacheableEntity>,
    ) -> CacheResult<CacheKey> {
        let primary_key = match entity {
            Some(entity) => match custom_key(entity) {
                Some(key) => self.format.escape(&key).into_owned(),
                None => self.primary_key_string(schema, entity),
            },
            None => String::new(),
        };
        self.derive_key(config, &schema.table, &primary_key)
    }

    /// Key for a point lookup on `value` in `table`.
    ///
    /// Built from the looked-up value alone. A zero value is
    /// [`CacheError::KeyNotFound`].
    pub fn lookup_key(
        &self,
        config: &CacheConfig,
        table: &str,
        value: &FieldValue,
    ) -> CacheResult<CacheKey> {
        let rendered = if value.is_zero() {
            String::new()
        } else {
            value.to_string()
        };
        let primary_key = self.format.join_values([rendered]);
        self.derive_key(config, table, &primary_key)
    }

    /// Whether `entity` replaces its primary-key string with its own key.
    ///
    /// Such entities are only cached through writes: a lookup by primary-key
    /// value cannot know which override a row was stored under.
    pub fn overrides_key(&self, entity: Option<&dyn CacheableEntity>) -> bool {
        entity.and_then(custom_key).is_some()
    }

    /// Recognize `WHERE pk IN (v)` (or `pk = v`) on a single-column key.
    pub fn detect_point_lookup(&self, schema: &Schema, clauses: &[FilterExpr]) -> PointLookup {
        let Some(primary) = schema.single_primary_field() else {
            return PointLookup::Skip;
        };
        let [clause] = clauses else {
            return PointLookup::Skip;
        };
        if clause.field != primary {
            return PointLookup::Skip;
        }

        let value = match clause.operator {
            FilterOperator::In => clause.single_in_value(),
            FilterOperator::Eq => Some(&clause.value),
            _ => None,
        };

        value
            .and_then(FieldValue::from_json)
            .map(PointLookup::Key)
            .unwrap_or(PointLookup::Skip)
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(CacheConfig::default(), KeyFormat::default())
    }
}

fn custom_key(entity: &dyn CacheableEntity) -> Option<String> {
    entity.cache_key().filter(|key| !key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormcache_test_utils::generators::{arb_primary_value, arb_table_name};
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    /// Entity whose columns and capabilities are set per test.
    #[derive(Default)]
    struct Row {
        fields: Vec<(&'static str, FieldValue)>,
        config: Option<CacheConfig>,
        enabled: Option<bool>,
        disabled: Option<bool>,
        key: Option<String>,
    }

    impl Row {
        fn with_id(id: u64) -> Self {
            Self {
                fields: vec![("id", id.into())],
                ..Default::default()
            }
        }
    }

    impl CacheableEntity for Row {
        fn field_value(&self, field: &str) -> Option<FieldValue> {
            self.fields
                .iter()
                .find(|(name, _)| *name == field)
                .map(|(_, value)| value.clone())
        }

        fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
            Ok(json!({}))
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

    fn orders() -> Schema {
        Schema::new("Order").with_primary_field("id")
    }

    fn resolver() -> Resolver {
        Resolver::new(CacheConfig::new().with_prefix("prefix"), KeyFormat::default())
    }

    #[test]
    fn test_entity_key() {
        let r = resolver();
        let key = r
            .entity_key(r.default_config(), &orders(), Some(&Row::with_id(7)))
            .unwrap();
        assert_eq!(key.as_str(), "prefix:Order:7");
    }

    #[test]
    fn test_composite_key_skips_zero_fields() {
        let r = resolver();
        let schema = Schema::new("line_items")
            .with_primary_field("order_id")
            .with_primary_field("line")
            .with_primary_field("variant");
        let row = Row {
            fields: vec![
                ("order_id", 0u64.into()),
                ("line", 3u32.into()),
                ("variant", "blue".into()),
            ],
            ..Default::default()
        };
        assert_eq!(r.primary_key_string(&schema, &row), "3_blue");
    }

    #[test]
    fn test_zero_key_is_key_not_found() {
        let r = resolver();
        let err = r
            .entity_key(r.default_config(), &orders(), Some(&Row::with_id(0)))
            .unwrap_err();
        assert_eq!(
            err,
            CacheError::KeyNotFound {
                table: "Order".to_string()
            }
        );
        assert!(r.entity_key(r.default_config(), &orders(), None).is_err());
    }

    #[test]
    fn test_custom_key_override() {
        let r = resolver();
        let row = Row {
            key: Some("sku-9".to_string()),
            ..Row::with_id(7)
        };
        let key = r.entity_key(r.default_config(), &orders(), Some(&row)).unwrap();
        assert_eq!(key.as_str(), "prefix:Order:sku-9");

        // An empty override is ignored.
        let row = Row {
            key: Some(String::new()),
            ..Row::with_id(7)
        };
        let key = r.entity_key(r.default_config(), &orders(), Some(&row)).unwrap();
        assert_eq!(key.as_str(), "prefix:Order:7");
    }

    #[test]
    fn test_resolve_config_prefers_entity() {
        let r = resolver();
        assert_eq!(r.resolve_config(None).key_prefix, "prefix");
        assert_eq!(r.resolve_config(Some(&Row::with_id(1))).key_prefix, "prefix");

        let row = Row {
            config: Some(
                CacheConfig::new()
                    .with_prefix("custom")
                    .with_ttl(Duration::from_secs(60)),
            ),
            ..Row::with_id(1)
        };
        let config = r.resolve_config(Some(&row));
        assert_eq!(config.key_prefix, "custom");
        assert_eq!(config.ttl, ormcache_core::Ttl::After(Duration::from_secs(60)));
    }

    #[test]
    fn test_enablement_rules() {
        let r = resolver();
        let plain = Row::with_id(1);
        assert!(r.is_enabled(Some(&plain), true));
        assert!(!r.is_enabled(Some(&plain), false));
        assert!(r.is_enabled(None, true));

        let disabled = Row {
            disabled: Some(true),
            ..Row::with_id(1)
        };
        assert!(!r.is_enabled(Some(&disabled), true));

        let not_disabled = Row {
            disabled: Some(false),
            ..Row::with_id(1)
        };
        assert!(r.is_enabled(Some(&not_disabled), false));

        // Enable wins over disable.
        let both = Row {
            enabled: Some(true),
            disabled: Some(true),
            ..Row::with_id(1)
        };
        assert!(r.is_enabled(Some(&both), false));

        let explicitly_off = Row {
            enabled: Some(false),
            disabled: Some(false),
            ..Row::with_id(1)
        };
        assert!(!r.is_enabled(Some(&explicitly_off), true));
    }

    #[test]
    fn test_detect_point_lookup() {
        let r = resolver();
        let schema = orders();

        assert_eq!(
            r.detect_point_lookup(&schema, &[FilterExpr::in_list("id", vec![json!(7)])]),
            PointLookup::Key(FieldValue::UInt(7))
        );
        assert_eq!(
            r.detect_point_lookup(&schema, &[FilterExpr::eq("id", json!("abc"))]),
            PointLookup::Key(FieldValue::Str("abc".to_string()))
        );
    }

    #[test]
    fn test_other_shapes_skip() {
        let r = resolver();
        let schema = orders();
        let skips: Vec<Vec<FilterExpr>> = vec![
            vec![],
            vec![FilterExpr::in_list("id", vec![json!(1), json!(2)])],
            vec![FilterExpr::in_list("id", vec![])],
            vec![FilterExpr::eq("total", json!(42))],
            vec![FilterExpr::new("id", FilterOperator::Gt, json!(7))],
            vec![FilterExpr::eq("id", json!([7]))],
            vec![
                FilterExpr::eq("id", json!(7)),
                FilterExpr::eq("total", json!(42)),
            ],
        ];
        for clauses in skips {
            assert_eq!(r.detect_point_lookup(&schema, &clauses), PointLookup::Skip);
        }

        let composite = Schema::new("t").with_primary_field("a").with_primary_field("b");
        assert_eq!(
            r.detect_point_lookup(&composite, &[FilterExpr::eq("a", json!(1))]),
            PointLookup::Skip
        );
    }

    #[test]
    fn test_lookup_key_matches_entity_key() {
        let r = resolver();
        let config = r.default_config();
        let from_lookup = r.lookup_key(config, "Order", &FieldValue::UInt(7)).unwrap();
        let from_entity = r
            .entity_key(config, &orders(), Some(&Row::with_id(7)))
            .unwrap();
        assert_eq!(from_lookup, from_entity);

        assert!(r.lookup_key(config, "Order", &FieldValue::UInt(0)).is_err());
    }

    #[test]
    fn test_lookup_key_depends_only_on_value() {
        let r = resolver();
        let config = r.default_config();
        let template = Row {
            key: Some("tenant-a".to_string()),
            ..Default::default()
        };
        assert!(r.overrides_key(Some(&template)));
        assert!(!r.overrides_key(Some(&Row::with_id(1))));
        assert!(!r.overrides_key(None));

        let one = r.lookup_key(config, "Order", &FieldValue::UInt(1)).unwrap();
        let two = r.lookup_key(config, "Order", &FieldValue::UInt(2)).unwrap();
        assert_ne!(one, two);
    }

    #[test]
    fn test_override_is_escaped() {
        let r = resolver();
        let row = Row {
            key: Some("a:b".to_string()),
            ..Row::with_id(7)
        };
        let key = r.entity_key(r.default_config(), &orders(), Some(&row)).unwrap();
        assert_eq!(key.as_str(), "prefix:Order:a%3Ab");
    }

    /// Schema and row with one primary-key column per value.
    fn keyed(table: &str, values: &[FieldValue]) -> (Schema, Row) {
        const NAMES: [&str; 3] = ["a", "b", "c"];
        let mut schema = Schema::new(table);
        let mut row = Row::default();
        for (name, value) in NAMES.iter().zip(values) {
            schema = schema.with_primary_field(*name);
            row.fields.push((*name, value.clone()));
        }
        (schema, row)
    }

    fn rendered(values: &[FieldValue]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_key_deterministic_and_injective(
            t1 in arb_table_name(),
            t2 in arb_table_name(),
            v1 in prop::collection::vec(arb_primary_value(), 1..=3),
            v2 in prop::collection::vec(arb_primary_value(), 1..=3),
        ) {
            let r = resolver();
            let config = r.default_config();
            let (s1, row1) = keyed(&t1, &v1);
            let (s2, row2) = keyed(&t2, &v2);

            let k1 = r.entity_key(config, &s1, Some(&row1)).unwrap();
            let again = r.entity_key(config, &s1, Some(&row1)).unwrap();
            let k2 = r.entity_key(config, &s2, Some(&row2)).unwrap();

            prop_assert_eq!(&k1, &again);
            prop_assert_eq!(k1 == k2, t1 == t2 && rendered(&v1) == rendered(&v2));
        }

        #[test]
        fn prop_lookup_matches_entity_key(table in arb_table_name(), value in arb_primary_value()) {
            let r = resolver();
            let config = r.default_config();
            let (schema, row) = keyed(&table, std::slice::from_ref(&value));

            prop_assert_eq!(
                r.lookup_key(config, &table, &value).unwrap(),
                r.entity_key(config, &schema, Some(&row)).unwrap()
            );
        }

        #[test]
        fn prop_zero_key_never_resolves(table in arb_table_name(), fields in 1usize..4) {
            let r = resolver();
            let zeros = vec![FieldValue::UInt(0); fields];
            let (schema, row) = keyed(&table, &zeros);
            let result = r.entity_key(r.default_config(), &schema, Some(&row));
            let is_key_not_found = matches!(result, Err(CacheError::KeyNotFound { .. }));
            prop_assert!(is_key_not_found);
        }
    }
}
