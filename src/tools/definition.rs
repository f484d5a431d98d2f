//! Package tool definitions and value types
//!
//! A definition is the metadata a registry returns for a tool identifier: what
//! the tool is called, which inputs it declares and where its implementation lives.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of tool a node invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    /// Plain function or class method tool
    Python,
    /// Hosted LLM call
    Llm,
    /// Render a prompt template
    Prompt,
    /// Package tool that consumes a prompt template
    CustomLlm,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Llm => "llm",
            Self::Prompt => "prompt",
            Self::CustomLlm => "custom_llm",
        }
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a tool or flow input
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueType {
    String,
    Int,
    Double,
    Bool,
    List,
    Object,
    PromptTemplate,
    /// Any connection type, e.g. `CustomConnection`
    Connection(String),
}

impl ValueType {
    /// Parse from string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "int" => Some(Self::Int),
            "double" => Some(Self::Double),
            "bool" => Some(Self::Bool),
            "list" => Some(Self::List),
            "object" => Some(Self::Object),
            "prompt_template" => Some(Self::PromptTemplate),
            other if other.ends_with("Connection") => Some(Self::Connection(other.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Object => "object",
            Self::PromptTemplate => "prompt_template",
            Self::Connection(name) => name,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Convert a literal to this type, or `None` if it cannot be represented.
    ///
    /// Strings are parsed for the scalar and JSON types; connections are never
    /// converted here.
    pub fn convert(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::String | Self::PromptTemplate, Value::String(_)) => Some(value.clone()),
            (Self::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (Self::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (Self::Int, Value::Number(n)) if n.is_f64() => n.as_f64().and_then(whole_i64).map(Value::from),
            // Integers above i64::MAX fail here
            (Self::Int, Value::Number(n)) => n.as_i64().map(Value::from),
            (Self::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (Self::Double, Value::Number(n)) => n.as_f64().and_then(finite_number),
            (Self::Double, Value::String(s)) => s.trim().parse::<f64>().ok().and_then(finite_number),
            (Self::Bool, Value::Bool(_)) => Some(value.clone()),
            (Self::Bool, Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (Self::List, Value::Array(_)) => Some(value.clone()),
            (Self::List, Value::String(s)) => serde_json::from_str::<Value>(s).ok().filter(Value::is_array),
            (Self::Object, Value::Object(_)) => Some(value.clone()),
            (Self::Object, Value::String(s)) => serde_json::from_str::<Value>(s).ok().filter(Value::is_object),
            _ => None,
        }
    }
}

/// `f` as an integer, if it is whole and within `i64` range
fn whole_i64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is out of range
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

/// NaN and infinities have no JSON form
fn finite_number(f: f64) -> Option<Value> {
    serde_json::Number::from_f64(f).map(Value::Number)
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ValueType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown value type '{}'", value))
    }
}

impl From<ValueType> for String {
    fn from(value: ValueType) -> Self {
        value.as_str().to_string()
    }
}

/// One declared input of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDefinition {
    /// Accepted types; the first is used for literal conversion
    #[serde(rename = "type")]
    pub value_types: Vec<ValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Allowed literal values
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl InputDefinition {
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_types: vec![value_type],
            default: None,
            allowed_values: None,
            description: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }

    pub fn primary_type(&self) -> Option<&ValueType> {
        self.value_types.first()
    }

    /// Connection type names this input accepts (empty if it takes no connection)
    pub fn connection_types(&self) -> Vec<String> {
        self.value_types
            .iter()
            .filter(|t| t.is_connection())
            .map(|t| t.as_str().to_string())
            .collect()
    }
}

/// Metadata describing a package tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Display name (e.g., "Content Safety (Text Analyze)")
    pub name: String,
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputDefinition>,
    /// Dotted module path
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ToolDefinition {
    /// Create a new function tool definition
    pub fn new(
        name: impl Into<String>,
        tool_type: ToolType,
        module: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            tool_type,
            inputs: BTreeMap::new(),
            module: module.into(),
            class_name: None,
            function: function.into(),
            description: None,
        }
    }

    /// Make this a class method tool
    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, input: InputDefinition) -> Self {
        self.inputs.insert(name.into(), input);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Fully qualified identifier: `module.Class.function` or `module.function`
    pub fn identifier(&self) -> String {
        match &self.class_name {
            Some(class_name) => format!("{}.{}.{}", self.module, class_name, self.function),
            None => format!("{}.{}", self.module, self.function),
        }
    }
}
