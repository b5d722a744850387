//! Configuration sources
//!
//! A `ConfigSource` yields raw string values by key. The process environment
//! is the production source; `MemorySource` backs tests and embedding.

use std::collections::HashMap;
use std::env;

/// Base trait for configuration sources
pub trait ConfigSource: Send + Sync {
    /// Get a raw string value, `None` when the key is unset
    fn get_string(&self, key: &str) -> Option<String>;

    /// Get the first key that is set, in order
    fn get_first(&self, keys: &[&str]) -> Option<(String, String)> {
        keys.iter()
            .find_map(|key| self.get_string(key).map(|value| (key.to_string(), value)))
    }
}

/// Process environment, with an optional `.env` file loaded first
#[derive(Debug, Clone, Default)]
pub struct EnvSource;

impl EnvSource {
    pub fn new() -> Self {
        Self
    }

    /// Load `.env` from the working directory (if any) and return the source
    pub fn with_dotenv() -> Self {
        match dotenv::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(err) if err.not_found() => {}
            Err(err) => tracing::warn!("Failed to load .env file: {}", err),
        }
        Self
    }
}

impl ConfigSource for EnvSource {
    fn get_string(&self, key: &str) -> Option<String> {
        match env::var(key) {
            Ok(value) => Some(value),
            Err(env::VarError::NotPresent) => None,
            Err(env::VarError::NotUnicode(_)) => {
                tracing::warn!("Environment variable {} is not valid unicode, ignoring", key);
                None
            }
        }
    }
}

/// In-memory source for tests or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    values: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Set a value, builder style
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        self.set(key, value);
        self
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }
}

impl ConfigSource for MemorySource {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
