//! Schema descriptors supplied by the persistence layer.
//!
//! The cache layer never reflects over entities. It reads primary-key values
//! through the ordered field list declared here.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A primary-key field value as seen by the cache layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    UInt(u64),
    Int(i64),
    Uuid(Uuid),
    Str(String),
    Null,
}

impl FieldValue {
    /// Whether this is the zero value of its type.
    ///
    /// Zero-valued primary-key fields are treated as "not loaded" and skipped
    /// during key derivation.
    pub fn is_zero(&self) -> bool {
        match self {
            FieldValue::Int(v) => *v == 0,
            FieldValue::UInt(v) => *v == 0,
            FieldValue::Uuid(v) => v.is_nil(),
            FieldValue::Str(v) => v.is_empty(),
            FieldValue::Null => true,
        }
    }

    /// Convert a JSON scalar into a field value.
    ///
    /// Strings stay strings, verbatim, whatever they look like: the key a
    /// query renders must equal the key the entity renders on write, and a
    /// `String` primary key renders as written. A [`Uuid`] key renders in its
    /// canonical hyphenated form, which is also what it serializes to.
    ///
    /// Arrays, objects, booleans and floats cannot identify a row and yield
    /// `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(FieldValue::Null),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    Some(FieldValue::UInt(v))
                } else {
                    n.as_i64().map(FieldValue::Int)
                }
            }
            serde_json::Value::String(s) => Some(FieldValue::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::UInt(v) => write!(f, "{}", v),
            FieldValue::Uuid(v) => write!(f, "{}", v),
            FieldValue::Str(v) => f.write_str(v),
            FieldValue::Null => Ok(()),
        }
    }
}

macro_rules! field_value_from {
    ($variant:ident as $target:ty: $($source:ty),+) => {
        $(
            impl From<$source> for FieldValue {
                fn from(v: $source) -> Self {
                    FieldValue::$variant(v as $target)
                }
            }
        )+
    };
}

field_value_from!(Int as i64: i8, i16, i32, i64, isize);
field_value_from!(UInt as u64: u8, u16, u32, u64, usize);

impl From<Uuid> for FieldValue {
    fn from(v: Uuid) -> Self {
        FieldValue::Uuid(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Table metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Table name used in cache keys
    pub table: String,
    /// Primary-key columns in declaration order
    pub primary_fields: Vec<String>,
}

impl Schema {
    /// Create a schema with no primary-key fields yet.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_fields: Vec::new(),
        }
    }

    /// Append a primary-key column.
    pub fn with_primary_field(mut self, name: impl Into<String>) -> Self {
        self.primary_fields.push(name.into());
        self
    }

    /// The sole primary-key column, if the key is not composite.
    pub fn single_primary_field(&self) -> Option<&str> {
        match self.primary_fields.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_values() {
        assert!(FieldValue::from(0i32).is_zero());
        assert!(FieldValue::from(0u64).is_zero());
        assert!(FieldValue::from("").is_zero());
        assert!(FieldValue::from(Uuid::nil()).is_zero());
        assert!(FieldValue::Null.is_zero());
        assert!(FieldValue::from(None::<u32>).is_zero());

        assert!(!FieldValue::from(-1i64).is_zero());
        assert!(!FieldValue::from(7u32).is_zero());
        assert!(!FieldValue::from("sku-1").is_zero());
        assert!(!FieldValue::from(Uuid::now_v7()).is_zero());
    }

    #[test]
    fn display_matches_key_form() {
        assert_eq!(FieldValue::from(7u32).to_string(), "7");
        assert_eq!(FieldValue::from(-3i16).to_string(), "-3");
        assert_eq!(FieldValue::from("sku-1").to_string(), "sku-1");
        assert_eq!(FieldValue::Null.to_string(), "");
    }

    #[test]
    fn from_json_scalars() {
        assert_eq!(FieldValue::from_json(&json!(7)), Some(FieldValue::UInt(7)));
        assert_eq!(FieldValue::from_json(&json!(-7)), Some(FieldValue::Int(-7)));
        assert_eq!(
            FieldValue::from_json(&json!("sku-1")),
            Some(FieldValue::Str("sku-1".to_string()))
        );
        assert_eq!(FieldValue::from_json(&json!(1.5)), None);
        assert_eq!(FieldValue::from_json(&json!([1])), None);
    }

    #[test]
    fn uuid_looking_strings_render_verbatim() {
        let raw = "550E8400-E29B-41D4-A716-446655440000";
        let from_json = FieldValue::from_json(&json!(raw)).unwrap();
        assert_eq!(from_json, FieldValue::Str(raw.to_string()));
        assert_eq!(from_json.to_string(), FieldValue::from(raw).to_string());

        // A typed id queried by its serialized form renders the same key.
        let id = Uuid::now_v7();
        let queried = FieldValue::from_json(&serde_json::to_value(id).unwrap()).unwrap();
        assert_eq!(queried.to_string(), FieldValue::from(id).to_string());
    }

    #[test]
    fn same_number_from_json_and_rust_renders_identically() {
        let from_json = FieldValue::from_json(&json!(42)).unwrap();
        let from_rust = FieldValue::from(42i32);
        assert_eq!(from_json.to_string(), from_rust.to_string());
    }

    #[test]
    fn single_primary_field() {
        let schema = Schema::new("orders").with_primary_field("id");
        assert_eq!(schema.single_primary_field(), Some("id"));

        let composite = Schema::new("order_lines")
            .with_primary_field("order_id")
            .with_primary_field("line_no");
        assert_eq!(composite.single_primary_field(), None);
        assert_eq!(Schema::new("t").single_primary_field(), None);
    }
}
