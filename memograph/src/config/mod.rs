//! Runtime configuration.
//!
//! A [`Config`] is a string-keyed map passed at initialization. Recognized
//! keys live in [`keys`]; unknown keys are preserved so domain plugins can
//! carry their own settings through the same map.

pub mod keys;

mod parser;

pub use parser::parse_config;

use std::collections::HashMap;
use thiserror::Error;

/// Errors from reading or parsing configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A line was not `key = value` or a comment.
    #[error("config line {line}: expected 'key = value', got '{text}'")]
    Malformed { line: usize, text: String },

    /// A value failed typed conversion.
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// String-keyed configuration map with typed getters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    entries: HashMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `key = value` lines; `#` starts a comment.
    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        parse_config(text)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_string(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    /// Typed getter for integer values.
    pub fn get_integer(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<u64>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.clone(),
                    reason: "expected a non-negative integer".to_string(),
                }),
        }
    }

    /// Typed getter for boolean values (`true`/`false`/`1`/`0`).
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.entries.get(key).map(String::as_str) {
            None => Ok(None),
            Some("true") | Some("1") => Ok(Some(true)),
            Some("false") | Some("0") => Ok(Some(false)),
            Some(raw) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
                reason: "expected true/false/1/0".to_string(),
            }),
        }
    }

    /// All keys, unordered.
    pub fn config_keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub(crate) fn insert_raw(&mut self, key: String, value: String) {
        self.entries.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut config = Config::new();
        config.set(keys::TESTING, "true");
        config.set(keys::RPCLIB_REQUEST_CONCURRENCY, "8");

        assert_eq!(config.get_bool(keys::TESTING).unwrap(), Some(true));
        assert_eq!(
            config.get_integer(keys::RPCLIB_REQUEST_CONCURRENCY).unwrap(),
            Some(8)
        );
        assert_eq!(config.get_string("missing"), None);
    }

    #[test]
    fn test_invalid_integer_reports_key() {
        let mut config = Config::new();
        config.set(keys::MEMORY_CACHE_UNUSED_SIZE_LIMIT, "lots");
        let err = config
            .get_integer(keys::MEMORY_CACHE_UNUSED_SIZE_LIMIT)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let mut config = Config::new();
        config.set(keys::TESTING, "maybe");
        assert!(config.get_bool(keys::TESTING).is_err());
    }
}
