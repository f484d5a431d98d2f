//! Connections - named bundles of credentials injected into tools
//!
//! Connections are supplied to the executor as a map of name to `{type, value}`,
//! the same shape whether read from YAML, JSON or built in code.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{FlowError, Result};

/// A named set of credentials and settings
#[derive(Clone, PartialEq)]
pub struct Connection {
    pub name: String,
    pub connection_type: String,
    values: BTreeMap<String, Value>,
}

impl Connection {
    pub fn new(name: impl Into<String>, connection_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection_type: connection_type.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value for `key`; non-string values are not coerced
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

// Values are secrets; keep them out of logs.
impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("connection_type", &self.connection_type)
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionEntry {
    #[serde(rename = "type")]
    connection_type: String,
    #[serde(default)]
    value: BTreeMap<String, Value>,
}

/// All connections available to one executor
#[derive(Debug, Clone, Default)]
pub struct ConnectionStore {
    connections: BTreeMap<String, Connection>,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load connections from a YAML or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            FlowError::Connection(format!(
                "Failed to read connection file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a `{name: {type, value}}` document; JSON is accepted as YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        let entries: Option<BTreeMap<String, ConnectionEntry>> = serde_yaml::from_str(content)
            .map_err(|e| FlowError::Connection(format!("Failed to parse connections: {}", e)))?;
        Ok(Self::from_entries(entries.unwrap_or_default()))
    }

    /// Build from an already parsed `{name: {type, value}}` value
    pub fn from_value(value: Value) -> Result<Self> {
        let entries: BTreeMap<String, ConnectionEntry> = serde_json::from_value(value)
            .map_err(|e| FlowError::Connection(format!("Failed to parse connections: {}", e)))?;
        Ok(Self::from_entries(entries))
    }

    fn from_entries(entries: BTreeMap<String, ConnectionEntry>) -> Self {
        let connections = entries
            .into_iter()
            .map(|(name, entry)| {
                let connection = Connection {
                    name: name.clone(),
                    connection_type: entry.connection_type,
                    values: entry.value,
                };
                (name, connection)
            })
            .collect();
        Self { connections }
    }

    pub fn insert(&mut self, connection: Connection) {
        self.connections.insert(connection.name.clone(), connection);
    }

    pub fn get(&self, name: &str) -> Option<&Connection> {
        self.connections.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.connections.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
