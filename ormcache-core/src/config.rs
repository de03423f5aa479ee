//! Configuration types

use crate::{CacheError, CacheResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default key prefix applied to every cache key.
pub const DEFAULT_KEY_PREFIX: &str = "ormcache";

/// Time-to-live for a cache entry.
///
/// Serialized as signed milliseconds: negative means never expire, zero means
/// the backend's default, positive is an explicit lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Ttl {
    /// Use whatever the backend considers its default lifetime
    #[default]
    Default,
    /// Never expires
    Never,
    /// Expires after the given duration
    After(Duration),
}

impl Ttl {
    /// Build a TTL from signed milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            m if m < 0 => Ttl::Never,
            0 => Ttl::Default,
            m => Ttl::After(Duration::from_millis(m as u64)),
        }
    }

    /// Signed milliseconds representation (inverse of [`Ttl::from_millis`]).
    pub fn as_millis(&self) -> i64 {
        match self {
            Ttl::Never => -1,
            Ttl::Default => 0,
            Ttl::After(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// Resolve to a concrete lifetime, `None` meaning "never expires".
    ///
    /// `backend_default` is consulted only for [`Ttl::Default`].
    pub fn resolve(self, backend_default: Ttl) -> Option<Duration> {
        match self {
            Ttl::After(d) => Some(d),
            Ttl::Never => None,
            Ttl::Default => match backend_default {
                Ttl::After(d) => Some(d),
                Ttl::Never | Ttl::Default => None,
            },
        }
    }
}

impl From<i64> for Ttl {
    fn from(millis: i64) -> Self {
        Ttl::from_millis(millis)
    }
}

impl From<Ttl> for i64 {
    fn from(ttl: Ttl) -> Self {
        ttl.as_millis()
    }
}

impl From<Duration> for Ttl {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Ttl::Default
        } else {
            Ttl::After(d)
        }
    }
}

/// Per-entity cache configuration.
///
/// A process-wide default instance is handed to the engine; entities may
/// supply their own through [`crate::CacheableEntity::cache_config`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix prepended to every key.
    pub key_prefix: String,
    /// Populate the cache from point-lookup queries.
    pub enable_read_cache: bool,
    /// Refresh the cache after writes instead of evicting.
    pub enable_write_cache: bool,
    /// Lifetime of entries written under this configuration.
    pub ttl: Ttl,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            enable_read_cache: true,
            enable_write_cache: false,
            ttl: Ttl::Default,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Enable or disable read-through population.
    pub fn with_read_cache(mut self, enabled: bool) -> Self {
        self.enable_read_cache = enabled;
        self
    }

    /// Enable or disable write-through refresh.
    pub fn with_write_cache(mut self, enabled: bool) -> Self {
        self.enable_write_cache = enabled;
        self
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: impl Into<Ttl>) -> Self {
        self.ttl = ttl.into();
        self
    }

    /// Validate the configuration.
    ///
    /// The prefix ends up verbatim in remote store keys, so it must be
    /// non-empty and free of whitespace and control characters.
    pub fn validate(&self) -> CacheResult<()> {
        if self.key_prefix.is_empty() {
            return Err(CacheError::Config(ConfigError::InvalidValue {
                field: "key_prefix".to_string(),
                value: String::new(),
                reason: "key_prefix must not be empty".to_string(),
            }));
        }

        if self
            .key_prefix
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(CacheError::Config(ConfigError::InvalidValue {
                field: "key_prefix".to_string(),
                value: self.key_prefix.clone(),
                reason: "key_prefix must not contain whitespace or control characters"
                    .to_string(),
            }));
        }

        Ok(())
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `ORMCACHE_KEY_PREFIX`: Key prefix (default: `ormcache`)
    /// - `ORMCACHE_ENABLE_READ_CACHE`: Read-through population (default: true)
    /// - `ORMCACHE_ENABLE_WRITE_CACHE`: Write-through refresh (default: false)
    /// - `ORMCACHE_TTL_MS`: Entry TTL in signed milliseconds (default: 0)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`CacheConfig::from_env`] but reading through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            key_prefix: lookup("ORMCACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            enable_read_cache: lookup("ORMCACHE_ENABLE_READ_CACHE")
                .and_then(|s| parse_flag(&s))
                .unwrap_or(defaults.enable_read_cache),
            enable_write_cache: lookup("ORMCACHE_ENABLE_WRITE_CACHE")
                .and_then(|s| parse_flag(&s))
                .unwrap_or(defaults.enable_write_cache),
            ttl: lookup("ORMCACHE_TTL_MS")
                .and_then(|s| s.trim().parse::<i64>().ok())
                .map(Ttl::from_millis)
                .unwrap_or(defaults.ttl),
        }
    }

    /// Parse a flat TOML document, e.g.
    ///
    /// ```toml
    /// key_prefix = "shop"
    /// enable_write_cache = true
    /// ttl = 600000
    /// ```
    pub fn from_toml_str(source: &str) -> CacheResult<Self> {
        let config: CacheConfig = toml::from_str(source).map_err(|e| {
            CacheError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// TESTS
// =============================================================================
