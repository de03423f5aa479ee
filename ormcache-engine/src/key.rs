//! Cache key layout.
//!
//! Table names and primary-key values are escaped before they are joined:
//! `%` and every character of either separator are written as `%XX` bytes.
//! Two different (table, values) pairs therefore never render the same key,
//! even when a string value contains a separator.

use std::borrow::Cow;
use std::fmt;

use ormcache_core::{CacheError, CacheResult, ConfigError};

/// Separators used when building keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFormat {
    separator: String,
    value_join: String,
}

impl Default for KeyFormat {
    fn default() -> Self {
        Self {
            separator: ":".to_string(),
            value_join: "_".to_string(),
        }
    }
}

impl KeyFormat {
    /// Build a format from the segment separator and the composite-key join.
    ///
    /// Both must be non-empty and free of `%` and ASCII alphanumerics, which
    /// the escape sequences themselves use.
    pub fn new(separator: impl Into<String>, value_join: impl Into<String>) -> CacheResult<Self> {
        let format = Self {
            separator: separator.into(),
            value_join: value_join.into(),
        };
        for (field, value) in [
            ("separator", &format.separator),
            ("value_join", &format.value_join),
        ] {
            if value.is_empty() || value.chars().any(|c| c == '%' || c.is_ascii_alphanumeric()) {
                return Err(CacheError::Config(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.clone(),
                    reason: "must be non-empty and contain no '%' or ASCII alphanumerics"
                        .to_string(),
                }));
            }
        }
        Ok(format)
    }

    /// Between prefix, table and primary-key string.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Between the values of a composite primary key.
    pub fn value_join(&self) -> &str {
        &self.value_join
    }

    fn is_reserved(&self, c: char) -> bool {
        c == '%' || self.separator.contains(c) || self.value_join.contains(c)
    }

    /// Escape one key segment.
    pub fn escape<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        if !raw.chars().any(|c| self.is_reserved(c)) {
            return Cow::Borrowed(raw);
        }
        let mut escaped = String::with_capacity(raw.len() + 8);
        for c in raw.chars() {
            if self.is_reserved(c) {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    escaped.push_str(&format!("%{:02X}", byte));
                }
            } else {
                escaped.push(c);
            }
        }
        Cow::Owned(escaped)
    }

    /// Escape and join primary-key value strings, skipping empty ones.
    pub fn join_values<I, S>(&self, values: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut joined = String::new();
        for value in values {
            let value = value.as_ref();
            if value.is_empty() {
                continue;
            }
            if !joined.is_empty() {
                joined.push_str(&self.value_join);
            }
            joined.push_str(&self.escape(value));
        }
        joined
    }
}

/// A fully qualified cache key: `prefix SEP table SEP primary-key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `primary_key` must already be escaped, as [`KeyFormat::join_values`]
    /// returns it. The table is escaped here; the prefix is used as is.
    pub fn new(format: &KeyFormat, prefix: &str, table: &str, primary_key: &str) -> Self {
        let sep = &format.separator;
        let table = format.escape(table);
        let mut key =
            String::with_capacity(prefix.len() + table.len() + primary_key.len() + 2 * sep.len());
        key.push_str(prefix);
        key.push_str(sep);
        key.push_str(&table);
        key.push_str(sep);
        key.push_str(primary_key);
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let key = CacheKey::new(&KeyFormat::default(), "prefix", "Order", "7");
        assert_eq!(key.as_str(), "prefix:Order:7");
        assert_eq!(key.to_string(), "prefix:Order:7");
    }

    #[test]
    fn test_custom_separator() {
        let format = KeyFormat::new("/", "-").unwrap();
        let key = CacheKey::new(&format, "app", "orders", &format.join_values(["1", "2"]));
        assert_eq!(key.into_string(), "app/orders/1-2");
    }

    #[test]
    fn test_rejects_unusable_separators() {
        assert!(KeyFormat::new("", "_").is_err());
        assert!(KeyFormat::new(":", "%").is_err());
        assert!(KeyFormat::new("x", "_").is_err());
        assert!(KeyFormat::new("::", "|").is_ok());
    }

    #[test]
    fn test_join_values_skips_empty() {
        let format = KeyFormat::default();
        assert_eq!(format.join_values(["", "a", "", "b"]), "a_b");
        assert_eq!(format.join_values(Vec::<String>::new()), "");
        assert_eq!(format.join_values([""]), "");
    }

    #[test]
    fn test_separators_inside_values_are_escaped() {
        let format = KeyFormat::default();
        let left = format.join_values(["a_b", "c"]);
        let right = format.join_values(["a", "b_c"]);
        assert_eq!(left, "a%5Fb_c");
        assert_eq!(right, "a_b%5Fc");
        assert_ne!(left, right);

        assert_eq!(format.escape("50%:off"), "50%25%3Aoff");
        assert!(matches!(format.escape("plain-7"), Cow::Borrowed("plain-7")));

        let split = CacheKey::new(&format, "p", "a:b", "c");
        let joined = CacheKey::new(&format, "p", "a", &format.join_values(["b:c"]));
        assert_eq!(split.as_str(), "p:a%3Ab:c");
        assert_ne!(split, joined);
    }
}
