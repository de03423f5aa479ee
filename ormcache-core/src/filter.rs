//! Filter clauses attached to a data-access operation.
//!
//! The persistence layer hands these to the cache layer so it can recognize
//! primary-key point lookups. Values are kept as JSON for flexibility.

use serde::{Deserialize, Serialize};

/// Filter operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
    /// Contains substring (for strings)
    Contains,
    /// In list of values
    In,
}

/// A single `WHERE` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpr {
    /// Column the clause applies to
    pub field: String,
    /// Operator to apply
    pub operator: FilterOperator,
    /// Value to compare against
    pub value: serde_json::Value,
}

impl FilterExpr {
    /// Create a new filter expression.
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: serde_json::Value,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(field, FilterOperator::Eq, value)
    }

    /// Create an `IN (...)` filter.
    pub fn in_list(field: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        Self::new(field, FilterOperator::In, serde_json::Value::Array(values))
    }

    /// The lone value of an `IN (v)` clause.
    ///
    /// Returns `None` for any other operator and for lists that do not hold
    /// exactly one element.
    pub fn single_in_value(&self) -> Option<&serde_json::Value> {
        if self.operator != FilterOperator::In {
            return None;
        }
        match &self.value {
            serde_json::Value::Array(values) if values.len() == 1 => values.first(),
            _ => None,
        }
    }
}
