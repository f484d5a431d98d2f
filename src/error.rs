//! Error types for flowrun
//!
//! Centralized error handling using thiserror.
//!
//! Tool resolution failures have two levels: every cause is wrapped in a
//! [`ResolveToolError`] whose message always reads
//! `Tool load failed in '<node>': (<Kind>) <cause>`, while the typed cause stays
//! available through [`ResolveToolError::inner_exception`].

use std::collections::BTreeSet;

use serde_json::Value;
use thiserror::Error;

/// All error types that can occur in flowrun
#[derive(Debug, Error)]
pub enum FlowError {
    /// A node's tool could not be resolved
    #[error(transparent)]
    ResolveTool(#[from] ResolveToolError),

    /// Structural problem in the flow definition
    #[error("Invalid flow: {0}")]
    InvalidFlow(String),

    /// A declared flow input was neither supplied nor defaulted
    #[error("The value for flow input '{0}' is not provided in input data.")]
    InputNotFound(String),

    /// A flow input could not be converted to its declared type
    #[error("Input '{input}' of value {value} is not type {value_type}.")]
    InputTypeMismatch {
        input: String,
        value: String,
        value_type: String,
    },

    /// A node input referenced something that does not exist at run time
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// A tool raised while a line was running
    #[error("Execution failure in '{node_name}': {source}")]
    ToolExecution {
        node_name: String,
        #[source]
        source: ToolError,
    },

    /// A bulk line did not finish (its worker task panicked or was cancelled)
    #[error("Line {index} aborted: {reason}")]
    LineAborted { index: usize, reason: String },

    /// Package tool manifest could not be read
    #[error("Invalid package tool manifest: {0}")]
    Manifest(String),

    /// Connection file could not be read
    #[error("Connection error: {0}")]
    Connection(String),

    /// Prompt template could not be compiled or rendered
    #[error("Template error: {0}")]
    Template(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl FlowError {
    /// Short kind name used in run records
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ResolveTool(_) => "ResolveToolError",
            Self::InvalidFlow(_) => "InvalidFlow",
            Self::InputNotFound(_) => "InputNotFound",
            Self::InputTypeMismatch { .. } => "InputTypeMismatch",
            Self::InvalidReference(_) => "InvalidReference",
            Self::ToolExecution { .. } => "ToolExecutionError",
            Self::LineAborted { .. } => "LineAborted",
            Self::Manifest(_) => "ManifestError",
            Self::Connection(_) => "ConnectionError",
            Self::Template(_) => "TemplateError",
            Self::Io(_) => "IoError",
            Self::Json(_) => "JsonError",
            Self::Yaml(_) => "YamlError",
        }
    }
}

/// Result type alias for flowrun operations
pub type Result<T> = std::result::Result<T, FlowError>;

/// Failure raised by a tool implementation, at construction or at call time.
///
/// `kind` is the exception-style type name embedded verbatim in messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("({kind}) {message}")]
pub struct ToolError {
    kind: String,
    message: String,
}

impl ToolError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Generic failure, reported with kind `Exception`
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new("Exception", message)
    }

    /// Missing or malformed argument, reported with kind `ValueError`
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The node's tool identifier is absent from the registry result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Package tool '{tool}' is not found in the current environment. All available package tools are: {list}.",
    list = format_list(.available)
)]
pub struct PackageToolNotFoundError {
    pub tool: String,
    /// Identifiers the registry did return, in its order
    pub available: Vec<String>,
}

/// The tool was found but loading or constructing it failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to load package tool '{tool_name}': {source}")]
pub struct ToolLoadError {
    pub tool_name: String,
    #[source]
    pub source: ToolError,
}

/// A node's inputs are inconsistent with its tool
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NodeInputValidationError {
    pub node_name: String,
    /// Offending input names
    pub inputs: BTreeSet<String>,
    message: String,
}

impl NodeInputValidationError {
    /// Prompt template variables that collide with the custom LLM tool's own inputs
    pub fn duplicated_prompt_inputs(node_name: &str, duplicated: BTreeSet<String>) -> Self {
        let message = format!(
            "Invalid inputs {} in prompt template of node {}. \
             These inputs are duplicated with the inputs of custom llm tool.",
            format_set(&duplicated),
            node_name
        );
        Self {
            node_name: node_name.to_string(),
            inputs: duplicated,
            message,
        }
    }

    /// Literal input that cannot be converted to the declared type
    pub fn type_mismatch(node_name: &str, input: &str, value: &Value, value_type: &str) -> Self {
        let message = format!(
            "Input '{}' for node '{}' of value {} is not type {}.",
            input, node_name, value, value_type
        );
        Self {
            node_name: node_name.to_string(),
            inputs: BTreeSet::from([input.to_string()]),
            message,
        }
    }

    /// Connection bound to an input that does not accept its type
    pub fn connection_type_mismatch(node_name: &str, input: &str, actual: &str, expected: &[String]) -> Self {
        let message = format!(
            "Input '{}' for node '{}' of type {} is not supported, valid types {}.",
            input,
            node_name,
            actual,
            format_list(expected)
        );
        Self {
            node_name: node_name.to_string(),
            inputs: BTreeSet::from([input.to_string()]),
            message,
        }
    }

    /// Literal outside the input's enumerated values
    pub fn not_allowed(node_name: &str, input: &str, value: &Value, allowed: &[Value]) -> Self {
        let allowed: Vec<String> = allowed.iter().map(Value::to_string).collect();
        let message = format!(
            "Input '{}' for node '{}' of value {} is not one of [{}].",
            input,
            node_name,
            value,
            allowed.join(", ")
        );
        Self {
            node_name: node_name.to_string(),
            inputs: BTreeSet::from([input.to_string()]),
            message,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A connection-typed input names a connection that was not supplied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Connection '{connection}' not found.")]
pub struct ConnectionNotFound {
    pub node_name: String,
    pub connection: String,
}

/// The node's source is missing, of the wrong kind, or unreadable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InvalidSource {
    pub node_name: String,
    message: String,
}

impl InvalidSource {
    pub fn missing(node_name: &str) -> Self {
        Self {
            node_name: node_name.to_string(),
            message: format!("Node {} does not have source defined.", node_name),
        }
    }

    pub fn missing_field(node_name: &str, field: &str) -> Self {
        Self {
            node_name: node_name.to_string(),
            message: format!("Node source of '{}' does not define '{}'.", node_name, field),
        }
    }

    pub fn path(node_name: &str, path: &str) -> Self {
        Self {
            node_name: node_name.to_string(),
            message: format!("Node source path '{}' is invalid on node '{}'.", path, node_name),
        }
    }

    pub fn source_type(node_name: &str, tool_type: &str, source_type: &str) -> Self {
        Self {
            node_name: node_name.to_string(),
            message: format!(
                "Source type '{}' is not valid for {} node '{}'.",
                source_type, tool_type, node_name
            ),
        }
    }

    pub fn template(node_name: &str, reason: impl std::fmt::Display) -> Self {
        Self {
            node_name: node_name.to_string(),
            message: format!("Failed to parse prompt template of node '{}': {}", node_name, reason),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The node's tool type cannot be executed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Tool type {tool_type} is not supported yet.")]
pub struct UnsupportedToolType {
    pub tool_type: String,
}

/// Inner cause of a [`ResolveToolError`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveCause {
    #[error(transparent)]
    PackageToolNotFound(#[from] PackageToolNotFoundError),

    #[error(transparent)]
    ToolLoad(#[from] ToolLoadError),

    #[error(transparent)]
    NodeInputValidation(#[from] NodeInputValidationError),

    #[error(transparent)]
    ConnectionNotFound(#[from] ConnectionNotFound),

    #[error(transparent)]
    InvalidSource(#[from] InvalidSource),

    #[error(transparent)]
    UnsupportedToolType(#[from] UnsupportedToolType),
}

impl ResolveCause {
    /// Error kind name shown in parentheses in the outer message
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PackageToolNotFound(_) => "PackageToolNotFoundError",
            Self::ToolLoad(_) => "ToolLoadError",
            Self::NodeInputValidation(_) => "NodeInputValidationError",
            Self::ConnectionNotFound(_) => "ConnectionNotFound",
            Self::InvalidSource(_) => "InvalidSource",
            Self::UnsupportedToolType(_) => "UnsupportedToolType",
        }
    }
}

/// Failure to resolve the tool of one node
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Tool load failed in '{node_name}': ({kind}) {inner}", kind = .inner.kind())]
pub struct ResolveToolError {
    pub node_name: String,
    #[source]
    inner: ResolveCause,
}

impl ResolveToolError {
    pub fn new(node_name: impl Into<String>, inner: impl Into<ResolveCause>) -> Self {
        Self {
            node_name: node_name.into(),
            inner: inner.into(),
        }
    }

    /// The typed cause, unchanged
    pub fn inner_exception(&self) -> &ResolveCause {
        &self.inner
    }

    pub fn into_inner(self) -> ResolveCause {
        self.inner
    }

    /// Full formatted message
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Render names as a bracketed, single-quoted list: `['a', 'b']`
pub fn format_list<S: AsRef<str>>(items: &[S]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("'{}'", s.as_ref())).collect();
    format!("[{}]", quoted.join(", "))
}

/// Render names as a braced, single-quoted set: `{'a', 'b'}`
pub fn format_set(items: &BTreeSet<String>) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("'{}'", s)).collect();
    format!("{{{}}}", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_format_list() {
        assert_eq!(format_list(&["a.b.c", "d.e"]), "['a.b.c', 'd.e']");
        assert_eq!(format_list::<&str>(&[]), "[]");
    }

    #[test]
    fn test_format_set() {
        let set = BTreeSet::from(["api".to_string()]);
        assert_eq!(format_set(&set), "{'api'}");
        let set = BTreeSet::from(["b".to_string(), "a".to_string()]);
        assert_eq!(format_set(&set), "{'a', 'b'}");
    }

    #[test]
    fn test_package_tool_not_found_message() {
        let err = PackageToolNotFoundError {
            tool: "pkg.mod.Tool.run".to_string(),
            available: vec!["pkg.a.A.go".to_string(), "pkg.b.B.go".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Package tool 'pkg.mod.Tool.run' is not found in the current environment. \
             All available package tools are: ['pkg.a.A.go', 'pkg.b.B.go']."
        );
    }

    #[test]
    fn test_tool_load_error_message() {
        let err = ToolLoadError {
            tool_name: "My tool".to_string(),
            source: ToolError::msg("boom"),
        };
        assert_eq!(err.to_string(), "Failed to load package tool 'My tool': (Exception) boom");
        assert_eq!(err.source().map(|s| s.to_string()), Some("(Exception) boom".to_string()));
    }

    #[test]
    fn test_resolve_tool_error_wraps_inner() {
        let inner = UnsupportedToolType {
            tool_type: "llm".to_string(),
        };
        let err = ResolveToolError::new("summarize", inner.clone());
        assert_eq!(
            err.message(),
            "Tool load failed in 'summarize': (UnsupportedToolType) Tool type llm is not supported yet."
        );
        assert_eq!(err.inner_exception(), &ResolveCause::UnsupportedToolType(inner));
    }

    #[test]
    fn test_duplicated_prompt_inputs_message() {
        let err = NodeInputValidationError::duplicated_prompt_inputs("my_node", BTreeSet::from(["api".to_string()]));
        assert_eq!(
            err.to_string(),
            "Invalid inputs {'api'} in prompt template of node my_node. \
             These inputs are duplicated with the inputs of custom llm tool."
        );
        assert!(err.inputs.contains("api"));
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = NodeInputValidationError::type_mismatch("n", "count", &Value::String("abc".into()), "int");
        assert_eq!(err.to_string(), "Input 'count' for node 'n' of value \"abc\" is not type int.");
    }

    #[test]
    fn test_tool_execution_error() {
        let err = FlowError::ToolExecution {
            node_name: "fetch".to_string(),
            source: ToolError::new("ValueError", "bad url"),
        };
        assert_eq!(err.to_string(), "Execution failure in 'fetch': (ValueError) bad url");
        assert_eq!(err.kind(), "ToolExecutionError");
    }

    #[test]
    fn test_resolve_tool_error_conversion() {
        let err: FlowError = ResolveToolError::new("n", InvalidSource::missing("n")).into();
        assert!(matches!(err, FlowError::ResolveTool(_)));
        assert_eq!(
            err.to_string(),
            "Tool load failed in 'n': (InvalidSource) Node n does not have source defined."
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FlowError = io_err.into();
        assert!(matches!(err, FlowError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: FlowError = json_err.into();
        assert!(matches!(err, FlowError::Json(_)));
    }
}
