//! Flow definitions
//!
//! A flow is a list of nodes read from a `flow.dag.yaml`-style document. Each node
//! names one tool through its `source` and binds that tool's inputs to literals,
//! flow inputs (`${inputs.x}`) or upstream outputs (`${node.output}`).

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowError, Result};
use crate::tools::{ToolType, ValueType};

/// Where a node input gets its value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum InputAssignment {
    /// Fixed value from the flow definition
    Literal(Value),
    /// `${inputs.<name>}`
    FlowInput(String),
    /// `${<node>.output}` or `${<node>.output.<path>}`
    NodeOutput { node: String, path: Vec<String> },
}

impl InputAssignment {
    /// Parse a raw YAML value; anything that is not a `${...}` reference is a literal
    pub fn parse(value: Value) -> Self {
        let Some(reference) = value
            .as_str()
            .and_then(|s| s.trim().strip_prefix("${"))
            .and_then(|s| s.strip_suffix('}'))
            .map(str::to_string)
        else {
            return Self::Literal(value);
        };

        let parts: Vec<&str> = reference.split('.').map(str::trim).collect();
        match parts.as_slice() {
            ["inputs", name] if !name.is_empty() => Self::FlowInput(name.to_string()),
            [node, "output", path @ ..] if !node.is_empty() => Self::NodeOutput {
                node: node.to_string(),
                path: path.iter().map(|p| p.to_string()).collect(),
            },
            _ => Self::Literal(value),
        }
    }

    /// Name of the upstream node this assignment reads from
    pub fn referenced_node(&self) -> Option<&str> {
        match self {
            Self::NodeOutput { node, .. } => Some(node),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

impl From<Value> for InputAssignment {
    fn from(value: Value) -> Self {
        Self::parse(value)
    }
}

impl From<InputAssignment> for Value {
    fn from(assignment: InputAssignment) -> Self {
        match assignment {
            InputAssignment::Literal(value) => value,
            InputAssignment::FlowInput(name) => Value::String(format!("${{inputs.{}}}", name)),
            InputAssignment::NodeOutput { node, path } => {
                let mut reference = format!("${{{}.output", node);
                for segment in path {
                    reference.push('.');
                    reference.push_str(&segment);
                }
                reference.push('}');
                Value::String(reference)
            }
        }
    }
}

/// Kind of node source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSourceType {
    /// Tool looked up in the package tool registry
    Package,
    /// Package tool plus a prompt template file
    PackageWithPrompt,
    /// File next to the flow
    Code,
}

impl ToolSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::PackageWithPrompt => "package_with_prompt",
            Self::Code => "code",
        }
    }
}

/// Where a node's tool comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSource {
    #[serde(rename = "type")]
    pub source_type: ToolSourceType,
    /// Package tool identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// File path relative to the flow directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ToolSource {
    pub fn package(tool: impl Into<String>) -> Self {
        Self {
            source_type: ToolSourceType::Package,
            tool: Some(tool.into()),
            path: None,
        }
    }

    pub fn package_with_prompt(tool: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            source_type: ToolSourceType::PackageWithPrompt,
            tool: Some(tool.into()),
            path: Some(path.into()),
        }
    }

    pub fn code(path: impl Into<String>) -> Self {
        Self {
            source_type: ToolSourceType::Code,
            tool: None,
            path: Some(path.into()),
        }
    }
}

/// One step of a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    #[serde(default)]
    pub source: Option<ToolSource>,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputAssignment>,
}

impl Node {
    pub fn new(name: impl Into<String>, tool_type: ToolType, source: ToolSource) -> Self {
        Self {
            name: name.into(),
            tool_type,
            source: Some(source),
            inputs: BTreeMap::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), InputAssignment::parse(value.into()));
        self
    }

    /// Upstream nodes this node reads from
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.inputs.values().filter_map(InputAssignment::referenced_node).collect()
    }
}

/// Declared flow input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowInputDefinition {
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Declared flow output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowOutputDefinition {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    pub reference: InputAssignment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A parsed and validated flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    #[serde(default)]
    pub inputs: BTreeMap<String, FlowInputDefinition>,
    #[serde(default)]
    pub outputs: BTreeMap<String, FlowOutputDefinition>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Directory that relative source paths are resolved against
    #[serde(skip)]
    pub working_dir: PathBuf,
}

impl Flow {
    /// Build a flow from nodes, validating it
    pub fn new(nodes: Vec<Node>) -> Result<Self> {
        let flow = Self {
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            nodes,
            working_dir: PathBuf::from("."),
        };
        flow.validate()?;
        Ok(flow)
    }

    /// Parse a flow from YAML; the working directory is the current one
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut flow: Self = serde_yaml::from_str(content)?;
        flow.working_dir = PathBuf::from(".");
        flow.validate()?;
        Ok(flow)
    }

    /// Load a flow file; its parent directory becomes the working directory
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlowError::InvalidFlow(format!("Failed to read flow file {}: {}", path.display(), e))
        })?;
        let mut flow = Self::from_yaml(&content)?;
        flow.working_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        log::debug!("Loaded flow with {} nodes from {}", flow.nodes.len(), path.display());
        Ok(flow)
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, input: FlowInputDefinition) -> Self {
        self.inputs.insert(name.into(), input);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, reference: &str) -> Self {
        self.outputs.insert(
            name.into(),
            FlowOutputDefinition {
                value_type: None,
                reference: InputAssignment::parse(Value::String(reference.to_string())),
                description: None,
            },
        );
        self
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Check node names are unique, references resolve and there are no cycles
    pub fn validate(&self) -> Result<()> {
        let mut names = BTreeSet::new();
        for node in &self.nodes {
            if node.name.is_empty() {
                return Err(FlowError::InvalidFlow("Node name must not be empty".to_string()));
            }
            if !names.insert(node.name.as_str()) {
                return Err(FlowError::InvalidFlow(format!("Duplicate node name '{}'", node.name)));
            }
        }

        for node in &self.nodes {
            for (input, assignment) in &node.inputs {
                match assignment {
                    InputAssignment::NodeOutput { node: upstream, .. } if !names.contains(upstream.as_str()) => {
                        return Err(FlowError::InvalidFlow(format!(
                            "Input '{}' of node '{}' references unknown node '{}'",
                            input, node.name, upstream
                        )));
                    }
                    InputAssignment::FlowInput(name) if !self.inputs.is_empty() && !self.inputs.contains_key(name) => {
                        return Err(FlowError::InvalidFlow(format!(
                            "Input '{}' of node '{}' references undefined flow input '{}'",
                            input, node.name, name
                        )));
                    }
                    _ => {}
                }
            }
        }

        for (name, output) in &self.outputs {
            if let Some(upstream) = output.reference.referenced_node()
                && !names.contains(upstream)
            {
                return Err(FlowError::InvalidFlow(format!(
                    "Output '{}' references unknown node '{}'",
                    name, upstream
                )));
            }
        }

        self.execution_order().map(|_| ())
    }

    /// Node indices in dependency order, ties broken by definition order
    pub fn execution_order(&self) -> Result<Vec<usize>> {
        let index: BTreeMap<&str, usize> = self.nodes.iter().enumerate().map(|(i, n)| (n.name.as_str(), i)).collect();
        let mut pending: Vec<BTreeSet<usize>> = self
            .nodes
            .iter()
            .map(|n| n.dependencies().iter().filter_map(|d| index.get(d).copied()).collect())
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut done = vec![false; self.nodes.len()];
        while order.len() < self.nodes.len() {
            let Some(next) = (0..self.nodes.len()).find(|&i| !done[i] && pending[i].is_empty()) else {
                let stuck: Vec<&str> = (0..self.nodes.len())
                    .filter(|&i| !done[i])
                    .map(|i| self.nodes[i].name.as_str())
                    .collect();
                return Err(FlowError::InvalidFlow(format!(
                    "Dependency cycle between nodes: {}",
                    stuck.join(", ")
                )));
            };
            done[next] = true;
            order.push(next);
            for deps in pending.iter_mut() {
                deps.remove(&next);
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const SAMPLE_FLOW: &str = r#"
inputs:
  text:
    type: string
    default: hello
outputs:
  answer:
    type: string
    reference: ${summarize.output}
nodes:
- name: summarize
  type: python
  source:
    type: package
    tool: pkg.echo.echo
  inputs:
    text: ${search.output.title}
- name: search
  type: python
  source:
    type: package
    tool: pkg.serpapi.SerpAPI.search
  inputs:
    connection: serp_connection
    query: ${inputs.text}
    num: 1
"#;

    #[test]
    fn test_parse_assignments() {
        assert_eq!(
            InputAssignment::parse(json!("${inputs.text}")),
            InputAssignment::FlowInput("text".to_string())
        );
        assert_eq!(
            InputAssignment::parse(json!("${fetch.output}")),
            InputAssignment::NodeOutput {
                node: "fetch".to_string(),
                path: vec![]
            }
        );
        assert_eq!(
            InputAssignment::parse(json!("${fetch.output.items.0}")),
            InputAssignment::NodeOutput {
                node: "fetch".to_string(),
                path: vec!["items".to_string(), "0".to_string()]
            }
        );
        assert_eq!(InputAssignment::parse(json!(3)), InputAssignment::Literal(json!(3)));
        assert_eq!(InputAssignment::parse(json!("plain")), InputAssignment::Literal(json!("plain")));
        assert_eq!(
            InputAssignment::parse(json!("${fetch.result}")),
            InputAssignment::Literal(json!("${fetch.result}"))
        );
    }

    #[test]
    fn test_assignment_into_value() {
        let reference = InputAssignment::parse(json!("${fetch.output.items}"));
        assert_eq!(Value::from(reference), json!("${fetch.output.items}"));
        assert_eq!(Value::from(InputAssignment::FlowInput("x".into())), json!("${inputs.x}"));
    }

    #[test]
    fn test_from_yaml() {
        let flow = Flow::from_yaml(SAMPLE_FLOW).unwrap();
        assert_eq!(flow.nodes.len(), 2);
        assert_eq!(flow.inputs["text"].default, Some(json!("hello")));

        let search = flow.node("search").unwrap();
        assert_eq!(search.tool_type, ToolType::Python);
        let source = search.source.as_ref().unwrap();
        assert_eq!(source.source_type, ToolSourceType::Package);
        assert_eq!(source.tool.as_deref(), Some("pkg.serpapi.SerpAPI.search"));
        assert_eq!(search.inputs["num"], InputAssignment::Literal(json!(1)));
        assert_eq!(search.inputs["query"], InputAssignment::FlowInput("text".to_string()));
    }

    #[test]
    fn test_execution_order_follows_dependencies() {
        let flow = Flow::from_yaml(SAMPLE_FLOW).unwrap();
        let order: Vec<&str> = flow
            .execution_order()
            .unwrap()
            .into_iter()
            .map(|i| flow.nodes[i].name.as_str())
            .collect();
        assert_eq!(order, vec!["search", "summarize"]);
    }

    #[test]
    fn test_execution_order_keeps_definition_order_for_independent_nodes() {
        let nodes = vec![
            Node::new("b", ToolType::Python, ToolSource::package("t.b")),
            Node::new("a", ToolType::Python, ToolSource::package("t.a")),
            Node::new("c", ToolType::Python, ToolSource::package("t.c")).with_input("x", "${a.output}"),
        ];
        let flow = Flow::new(nodes).unwrap();
        assert_eq!(flow.execution_order().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_duplicate_node_names() {
        let nodes = vec![
            Node::new("a", ToolType::Python, ToolSource::package("t.a")),
            Node::new("a", ToolType::Python, ToolSource::package("t.b")),
        ];
        let err = Flow::new(nodes).unwrap_err();
        assert!(err.to_string().contains("Duplicate node name 'a'"));
    }

    #[test]
    fn test_unknown_node_reference() {
        let nodes = vec![Node::new("a", ToolType::Python, ToolSource::package("t.a")).with_input("x", "${ghost.output}")];
        let err = Flow::new(nodes).unwrap_err();
        assert!(err.to_string().contains("unknown node 'ghost'"));
    }

    #[test]
    fn test_cycle_detected() {
        let nodes = vec![
            Node::new("a", ToolType::Python, ToolSource::package("t.a")).with_input("x", "${b.output}"),
            Node::new("b", ToolType::Python, ToolSource::package("t.b")).with_input("x", "${a.output}"),
        ];
        let err = Flow::new(nodes).unwrap_err();
        assert!(err.to_string().contains("Dependency cycle between nodes: a, b"));
    }

    #[test]
    fn test_undefined_flow_input() {
        let yaml = r#"
inputs:
  text: {type: string}
nodes:
- name: a
  type: python
  source: {type: package, tool: t.a}
  inputs:
    x: ${inputs.other}
"#;
        let err = Flow::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("undefined flow input 'other'"));
    }

    #[test]
    fn test_load_sets_working_dir() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("flow.dag.yaml");
        std::fs::write(&path, SAMPLE_FLOW).unwrap();

        let flow = Flow::load(&path).unwrap();
        assert_eq!(flow.working_dir, temp_dir.path());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Flow::load("/nonexistent/flow.dag.yaml").unwrap_err();
        assert!(matches!(err, FlowError::InvalidFlow(_)));
    }

    #[test]
    fn test_node_without_source_parses() {
        let yaml = r#"
nodes:
- name: a
  type: python
"#;
        let flow = Flow::from_yaml(yaml).unwrap();
        assert!(flow.nodes[0].source.is_none());
    }
}
