//! Error types for ormcache operations

use thiserror::Error;

/// Store layer errors.
///
/// Every variant is absorbed by the interception engine: a failing store never
/// fails the data-access operation it sits in front of.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Key not found in store: {key}")]
    NotFound { key: String },

    #[error("Stored value for {key} does not fit the destination: {reason}")]
    TypeMismatch { key: String, reason: String },

    #[error("Failed to encode value for {key}: {reason}")]
    Encode { key: String, reason: String },

    #[error("{backend} backend failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Whether this error only means "nothing cached under this key".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all ormcache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache key not found for table {table}")]
    KeyNotFound { table: String },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data source failed: {reason}")]
    Source { reason: String },
}

impl CacheError {
    /// Build a data-source failure from any displayable error.
    pub fn source(reason: impl std::fmt::Display) -> Self {
        CacheError::Source {
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for ormcache operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================
