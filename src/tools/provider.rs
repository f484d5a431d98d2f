//! Tool implementations and loading
//!
//! The registry says which package tools exist; the provider holds the code
//! behind them. Function tools are called directly. Class tools are
//! constructed first from the node inputs named in their init input list, and
//! construction may fail.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::domain::Connection;
use crate::error::ToolError;

use super::builtins;

/// A callable tool bound to one node
pub trait PackageTool: Send + Sync {
    /// Invoke the tool with the node's resolved arguments
    fn call(&self, args: &ToolArgs) -> Result<Value, ToolError>;
}

impl<F> PackageTool for F
where
    F: Fn(&ToolArgs) -> Result<Value, ToolError> + Send + Sync,
{
    fn call(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        self(args)
    }
}

/// One argument passed to a tool
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Value(Value),
    Connection(Connection),
}

/// Named arguments for constructing or calling a tool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    args: BTreeMap<String, ArgValue>,
}

impl ToolArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_value(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), ArgValue::Value(value));
    }

    pub fn insert_connection(&mut self, name: impl Into<String>, connection: Connection) {
        self.args.insert(name.into(), ArgValue::Connection(connection));
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_value(name, value.into());
        self
    }

    pub fn with_connection(mut self, name: impl Into<String>, connection: Connection) -> Self {
        self.insert_connection(name, connection);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.args.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.args.contains_key(name)
    }

    /// Plain value argument
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.args.get(name) {
            Some(ArgValue::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Required string argument
    pub fn str(&self, name: &str) -> Result<&str, ToolError> {
        self.value(name)
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::invalid_argument(format!("Missing string argument '{}'", name)))
    }

    /// Required connection argument
    pub fn connection(&self, name: &str) -> Result<&Connection, ToolError> {
        match self.args.get(name) {
            Some(ArgValue::Connection(connection)) => Ok(connection),
            _ => Err(ToolError::invalid_argument(format!(
                "Missing connection argument '{}'",
                name
            ))),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.args.keys().map(String::as_str)
    }

    /// Copy of the arguments named in `names`
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let args = names
            .iter()
            .filter_map(|n| self.args.get_key_value(n.as_ref()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { args }
    }

    /// Copy without the arguments named in `names`
    pub fn without<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let args = self
            .args
            .iter()
            .filter(|(k, _)| !names.iter().any(|n| n.as_ref() == k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { args }
    }

    /// Merge `other` into this set; `other` wins on conflicts
    pub fn extend(&mut self, other: ToolArgs) {
        self.args.extend(other.args);
    }

    /// Plain values as a JSON object, skipping connections (template context)
    pub fn value_context(&self) -> Value {
        let map: Map<String, Value> = self
            .args
            .iter()
            .filter_map(|(k, v)| match v {
                ArgValue::Value(value) => Some((k.clone(), value.clone())),
                ArgValue::Connection(_) => None,
            })
            .collect();
        Value::Object(map)
    }

    /// Arguments as recorded in run records; connections appear by name
    pub fn to_record(&self) -> BTreeMap<String, Value> {
        self.args
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    ArgValue::Value(value) => value.clone(),
                    ArgValue::Connection(connection) => Value::String(connection.name.clone()),
                };
                (k.clone(), value)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

type Constructor = Arc<dyn Fn(&ToolArgs) -> Result<Arc<dyn PackageTool>, ToolError> + Send + Sync>;

#[derive(Clone)]
enum Implementation {
    Function(Arc<dyn PackageTool>),
    Class {
        init_inputs: Vec<String>,
        constructor: Constructor,
    },
}

/// A constructed tool and the inputs its constructor consumed
#[derive(Clone)]
pub struct LoadedTool {
    pub tool: Arc<dyn PackageTool>,
    pub init_inputs: Vec<String>,
}

impl fmt::Debug for LoadedTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedTool").field("init_inputs", &self.init_inputs).finish()
    }
}

/// Table of package tool implementations keyed by identifier
#[derive(Clone, Default)]
pub struct ToolProvider {
    implementations: HashMap<String, Implementation>,
}

impl ToolProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider with the built-in tools registered
    pub fn with_builtins() -> Self {
        let mut provider = Self::new();
        builtins::register(&mut provider);
        provider
    }

    /// Register a function tool. Replaces any existing implementation.
    pub fn register_function<F>(&mut self, identifier: impl Into<String>, function: F)
    where
        F: Fn(&ToolArgs) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        self.register_tool(identifier, function);
    }

    /// Register a ready-made tool instance that needs no construction
    pub fn register_tool(&mut self, identifier: impl Into<String>, tool: impl PackageTool + 'static) {
        self.implementations
            .insert(identifier.into(), Implementation::Function(Arc::new(tool)));
    }

    /// Register a class tool whose constructor receives the named init inputs
    pub fn register_class<F>(&mut self, identifier: impl Into<String>, init_inputs: &[&str], constructor: F)
    where
        F: Fn(&ToolArgs) -> Result<Arc<dyn PackageTool>, ToolError> + Send + Sync + 'static,
    {
        self.implementations.insert(
            identifier.into(),
            Implementation::Class {
                init_inputs: init_inputs.iter().map(|s| s.to_string()).collect(),
                constructor: Arc::new(constructor),
            },
        );
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.implementations.contains_key(identifier)
    }

    /// Registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.implementations.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Load the implementation for `identifier`, constructing class tools from `args`
    pub fn load(&self, identifier: &str, args: &ToolArgs) -> Result<LoadedTool, ToolError> {
        match self.implementations.get(identifier) {
            None => Err(ToolError::new(
                "ModuleNotFoundError",
                format!("No implementation is registered for '{}'.", identifier),
            )),
            Some(Implementation::Function(tool)) => Ok(LoadedTool {
                tool: Arc::clone(tool),
                init_inputs: Vec::new(),
            }),
            Some(Implementation::Class {
                init_inputs,
                constructor,
            }) => {
                let tool = constructor(&args.subset(init_inputs))?;
                Ok(LoadedTool {
                    tool,
                    init_inputs: init_inputs.clone(),
                })
            }
        }
    }
}
