//! Ordered environment mapping

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Snapshot of the process environment, keyed by variable name
pub type Environment = HashMap<String, String>;

/// Error raised when an `env` block cannot be read as string pairs
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("env must be a mapping of names to values")]
    NotAMapping,

    #[error("env key must be a string, got {0}")]
    InvalidKey(String),

    #[error("env value for {key} must be a scalar")]
    InvalidValue { key: String },
}

/// Insertion-ordered string map used for `env` blocks.
///
/// Keys are unique: inserting an existing key replaces its value in place,
/// keeping the original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvMap {
    entries: Vec<(String, String)>,
}

impl EnvMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, v)| v.as_str())
    }

    /// Read an `env` block from a YAML value.
    ///
    /// Scalars are stringified, `null` becomes the empty string, and a
    /// key that stringifies to an earlier name (`1` and `"1"`) replaces it.
    pub fn from_value(value: &Value) -> Result<Self, EnvError> {
        let mapping = match value {
            Value::Mapping(m) => m,
            Value::Null => return Ok(Self::new()),
            _ => return Err(EnvError::NotAMapping),
        };

        let mut env = Self::new();
        for (k, v) in mapping {
            let key = scalar_to_string(k).ok_or_else(|| EnvError::InvalidKey(describe(k)))?;
            let value = match v {
                Value::Null => String::new(),
                other => scalar_to_string(other)
                    .ok_or_else(|| EnvError::InvalidValue { key: key.clone() })?,
            };
            env.insert(key, value);
        }
        Ok(env)
    }

    /// Convert back into an ordered YAML mapping
    pub fn to_mapping(&self) -> Mapping {
        self.entries
            .iter()
            .map(|(k, v)| (Value::String(k.clone()), Value::String(v.clone())))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Self::new();
        for (k, v) in iter {
            env.insert(k, v);
        }
        env
    }
}

impl Serialize for EnvMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Sequence(_) => "a list".to_string(),
        Value::Mapping(_) => "a mapping".to_string(),
        Value::Tagged(_) => "a tagged value".to_string(),
    }
}
