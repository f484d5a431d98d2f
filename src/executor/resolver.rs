//! Tool resolution
//!
//! Turns each node's tool reference into a callable before any line runs. Every
//! failure is reported as a [`ResolveToolError`] naming the node and carrying
//! the specific cause.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::{ConnectionStore, InputAssignment, Node, ToolSource, ToolSourceType};
use crate::error::{
    ConnectionNotFound, InvalidSource, NodeInputValidationError, PackageToolNotFoundError, ResolveCause,
    ResolveToolError, ToolError, ToolLoadError, UnsupportedToolType,
};
use crate::prompt::{PromptLoader, PromptTemplate};
use crate::tools::{PackageTool, PackageToolRegistry, ToolArgs, ToolDefinition, ToolProvider, ToolType};

/// Input that carries the template text of a custom LLM node
pub const PROMPT_INPUT: &str = "prompt";

/// A node with its tool loaded and literal inputs bound
#[derive(Clone)]
pub struct ResolvedTool {
    pub node: Node,
    /// Package tool metadata; `None` for prompt nodes
    pub definition: Option<ToolDefinition>,
    pub callable: Arc<dyn PackageTool>,
    /// Converted literals, connections and defaults, minus constructor inputs
    pub bound_args: ToolArgs,
}

impl fmt::Debug for ResolvedTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedTool")
            .field("node", &self.node.name)
            .field("definition", &self.definition.as_ref().map(|d| &d.name))
            .field("bound_args", &self.bound_args)
            .finish()
    }
}

/// Resolves nodes against a registry, a provider and a connection store
pub struct ToolResolver<'a> {
    loader: PromptLoader,
    connections: &'a ConnectionStore,
    registry: &'a dyn PackageToolRegistry,
    provider: &'a ToolProvider,
}

impl<'a> ToolResolver<'a> {
    pub fn new(
        working_dir: impl AsRef<Path>,
        connections: &'a ConnectionStore,
        registry: &'a dyn PackageToolRegistry,
        provider: &'a ToolProvider,
    ) -> Self {
        Self {
            loader: PromptLoader::new(working_dir),
            connections,
            registry,
            provider,
        }
    }

    /// Resolve one node
    pub fn resolve(&self, node: &Node) -> Result<ResolvedTool, ResolveToolError> {
        match self.resolve_node(node) {
            Ok(resolved) => {
                log::debug!("Resolved tool for node '{}'", node.name);
                Ok(resolved)
            }
            Err(cause) => {
                let err = ResolveToolError::new(node.name.clone(), cause);
                log::warn!("{}", err);
                Err(err)
            }
        }
    }

    fn resolve_node(&self, node: &Node) -> Result<ResolvedTool, ResolveCause> {
        let source = node.source.as_ref().ok_or_else(|| InvalidSource::missing(&node.name))?;

        match (node.tool_type, source.source_type) {
            (ToolType::Python, ToolSourceType::Package) => self.resolve_package_node(node, source),
            (ToolType::Python, ToolSourceType::Code) => Err(UnsupportedToolType {
                tool_type: format!("{} ({})", node.tool_type, source.source_type.as_str()),
            }
            .into()),
            (ToolType::CustomLlm, ToolSourceType::PackageWithPrompt) => {
                let resolved = self.resolve_package_node(node, source)?;
                self.integrate_prompt(node, source, resolved)
            }
            (ToolType::Prompt, ToolSourceType::Code) => self.resolve_prompt_node(node, source),
            (ToolType::Llm, _) => Err(UnsupportedToolType {
                tool_type: node.tool_type.to_string(),
            }
            .into()),
            (tool_type, source_type) => {
                Err(InvalidSource::source_type(&node.name, tool_type.as_str(), source_type.as_str()).into())
            }
        }
    }

    fn resolve_package_node(&self, node: &Node, source: &ToolSource) -> Result<ResolvedTool, ResolveCause> {
        let identifier = source
            .tool
            .as_deref()
            .ok_or_else(|| InvalidSource::missing_field(&node.name, "tool"))?;

        let keys = BTreeSet::from([identifier.to_string()]);
        let definition = match self.registry.collect(Some(&keys)).remove(identifier) {
            Some(Some(definition)) => definition,
            Some(None) => {
                return Err(ToolLoadError {
                    tool_name: identifier.to_string(),
                    source: ToolError::new(
                        "DefinitionNotFound",
                        format!("Package tool '{}' has no definition.", identifier),
                    ),
                }
                .into());
            }
            None => {
                let available = self.registry.collect(None).into_keys().collect();
                return Err(PackageToolNotFoundError {
                    tool: identifier.to_string(),
                    available,
                }
                .into());
            }
        };

        let args = self.bind_inputs(node, &definition)?;
        let loaded = self.provider.load(identifier, &args).map_err(|source| ToolLoadError {
            tool_name: definition.name.clone(),
            source,
        })?;

        Ok(ResolvedTool {
            node: node.clone(),
            definition: Some(definition),
            callable: loaded.tool,
            bound_args: args.without(&loaded.init_inputs),
        })
    }

    /// Convert literals to their declared types, bind connections and fill defaults
    fn bind_inputs(&self, node: &Node, definition: &ToolDefinition) -> Result<ToolArgs, ResolveCause> {
        let mut args = ToolArgs::new();

        for (name, assignment) in &node.inputs {
            let InputAssignment::Literal(value) = assignment else {
                continue;
            };
            let Some(input) = definition.inputs.get(name) else {
                args.insert_value(name.clone(), value.clone());
                continue;
            };

            let connection_types = input.connection_types();
            if !connection_types.is_empty() {
                let connection_name = value.as_str().ok_or_else(|| {
                    NodeInputValidationError::type_mismatch(&node.name, name, value, &connection_types.join(" | "))
                })?;
                let connection = self.connections.get(connection_name).ok_or_else(|| ConnectionNotFound {
                    node_name: node.name.clone(),
                    connection: connection_name.to_string(),
                })?;
                if !connection_types.contains(&connection.connection_type) {
                    return Err(NodeInputValidationError::connection_type_mismatch(
                        &node.name,
                        name,
                        &connection.connection_type,
                        &connection_types,
                    )
                    .into());
                }
                args.insert_connection(name.clone(), connection.clone());
                continue;
            }

            let converted = match input.primary_type() {
                Some(value_type) => value_type.convert(value).ok_or_else(|| {
                    NodeInputValidationError::type_mismatch(&node.name, name, value, value_type.as_str())
                })?,
                None => value.clone(),
            };
            if let Some(allowed) = &input.allowed_values
                && !allowed.contains(&converted)
            {
                return Err(NodeInputValidationError::not_allowed(&node.name, name, value, allowed).into());
            }
            args.insert_value(name.clone(), converted);
        }

        for (name, input) in &definition.inputs {
            if node.inputs.contains_key(name) {
                continue;
            }
            if let Some(default) = &input.default {
                args.insert_value(name.clone(), default.clone());
            }
        }

        Ok(args)
    }

    fn load_template(&self, node: &Node, source: &ToolSource) -> Result<PromptTemplate, ResolveCause> {
        let path = source
            .path
            .as_deref()
            .ok_or_else(|| InvalidSource::missing_field(&node.name, "path"))?;
        let text = self.loader.load(path).map_err(|e| {
            log::debug!("Failed to load template for node '{}': {}", node.name, e);
            InvalidSource::path(&node.name, path)
        })?;
        PromptTemplate::new(text).map_err(|e| InvalidSource::template(&node.name, e).into())
    }

    /// Attach the prompt template to a custom LLM node
    fn integrate_prompt(
        &self,
        node: &Node,
        source: &ToolSource,
        mut resolved: ResolvedTool,
    ) -> Result<ResolvedTool, ResolveCause> {
        let template = self.load_template(node, source)?;

        if let Some(definition) = &resolved.definition {
            let duplicated: BTreeSet<String> = template
                .variables()
                .iter()
                .filter(|v| definition.inputs.contains_key(v.as_str()))
                .cloned()
                .collect();
            if !duplicated.is_empty() {
                return Err(NodeInputValidationError::duplicated_prompt_inputs(&node.name, duplicated).into());
            }
        }

        resolved
            .bound_args
            .insert_value(PROMPT_INPUT, Value::String(template.source().to_string()));
        Ok(resolved)
    }

    fn resolve_prompt_node(&self, node: &Node, source: &ToolSource) -> Result<ResolvedTool, ResolveCause> {
        let template = self.load_template(node, source)?;

        let mut args = ToolArgs::new();
        for (name, assignment) in &node.inputs {
            if let InputAssignment::Literal(value) = assignment {
                args.insert_value(name.clone(), value.clone());
            }
        }

        let callable = move |args: &ToolArgs| {
            template
                .render(&args.value_context())
                .map(Value::String)
                .map_err(|e| ToolError::new("TemplateError", e.to_string()))
        };

        Ok(ResolvedTool {
            node: node.clone(),
            definition: None,
            callable: Arc::new(callable),
            bound_args: args,
        })
    }
}

/// Resolve every node in definition order, stopping at the first failure
pub fn resolve_all(resolver: &ToolResolver<'_>, nodes: &[Node]) -> Result<BTreeMap<String, ResolvedTool>, ResolveToolError> {
    let mut resolved = BTreeMap::new();
    for node in nodes {
        resolved.insert(node.name.clone(), resolver.resolve(node)?);
    }
    Ok(resolved)
}
