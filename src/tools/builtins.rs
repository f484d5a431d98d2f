//! Built-in package tools
//!
//! A small set of tools that ship with the crate so flows can run without any
//! external manifest: a plain echo, a connection reader and an offline custom
//! LLM tool that renders its prompt instead of calling a model.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::ToolError;
use crate::prompt::PromptRenderer;

use super::definition::{InputDefinition, ToolDefinition, ToolType, ValueType};
use super::provider::{PackageTool, ToolArgs, ToolProvider};
use super::registry::ManifestRegistry;

pub const ECHO: &str = "flowrun.tools.echo.echo";
pub const CONNECTION_CONCAT: &str = "flowrun.tools.connection.ConnectionConcat.concat";
pub const ECHO_LLM: &str = "flowrun.tools.llm.EchoLlm.call";

const CONNECTION_TYPE: &str = "CustomConnection";
const DEFAULT_CONCAT_KEYS: [&str; 2] = ["name", "secret"];

/// Definitions of the built-in tools
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new("Echo", ToolType::Python, "flowrun.tools.echo", "echo")
            .with_input("text", InputDefinition::new(ValueType::String))
            .with_description("Return the input text unchanged."),
        ToolDefinition::new(
            "Connection Concat",
            ToolType::Python,
            "flowrun.tools.connection",
            "concat",
        )
        .with_class("ConnectionConcat")
        .with_input(
            "connection",
            InputDefinition::new(ValueType::Connection(CONNECTION_TYPE.to_string())),
        )
        .with_input(
            "keys",
            InputDefinition::new(ValueType::List).with_default(json!(DEFAULT_CONCAT_KEYS)),
        )
        .with_description("Concatenate values of a connection."),
        ToolDefinition::new("Echo LLM", ToolType::CustomLlm, "flowrun.tools.llm", "call")
            .with_class("EchoLlm")
            .with_input(
                "connection",
                InputDefinition::new(ValueType::Connection(CONNECTION_TYPE.to_string())),
            )
            .with_input("api", InputDefinition::new(ValueType::String))
            .with_description("Offline custom LLM tool that returns its rendered prompt."),
    ]
}

/// Registry holding the built-in definitions
pub fn registry() -> ManifestRegistry {
    let mut registry = ManifestRegistry::new();
    for definition in definitions() {
        registry.add(definition);
    }
    registry
}

/// Register the built-in implementations
pub fn register(provider: &mut ToolProvider) {
    provider.register_function(ECHO, echo);
    provider.register_class(CONNECTION_CONCAT, &["connection"], |args: &ToolArgs| {
        let connection = args.connection("connection")?;
        Ok(Arc::new(ConnectionConcat {
            values: connection
                .keys()
                .filter_map(|k| connection.get_str(k).map(|v| (k.to_string(), v.to_string())))
                .collect(),
        }) as Arc<dyn PackageTool>)
    });
    provider.register_class(ECHO_LLM, &["connection"], |args: &ToolArgs| {
        args.connection("connection")?;
        Ok(Arc::new(EchoLlm {
            renderer: PromptRenderer::new(),
        }) as Arc<dyn PackageTool>)
    });
}

fn echo(args: &ToolArgs) -> Result<Value, ToolError> {
    Ok(json!(args.str("text")?))
}

struct ConnectionConcat {
    values: Vec<(String, String)>,
}

impl PackageTool for ConnectionConcat {
    fn call(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        let keys: Vec<String> = match args.value("keys") {
            None | Some(Value::Null) => DEFAULT_CONCAT_KEYS.iter().map(|k| k.to_string()).collect(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ToolError::invalid_argument(format!("Key {} is not a string", item)))
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(ToolError::invalid_argument(format!("Keys {} is not a list", other)));
            }
        };

        let mut out = String::new();
        for key in &keys {
            let value = self
                .values
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .ok_or_else(|| ToolError::new("KeyError", format!("'{}'", key)))?;
            out.push_str(value);
        }
        Ok(json!(out))
    }
}

struct EchoLlm {
    renderer: PromptRenderer,
}

impl PackageTool for EchoLlm {
    fn call(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        let prompt = args.str("prompt")?;
        args.str("api")?;
        let context = args.without(&["prompt", "api"]).value_context();
        let rendered = self
            .renderer
            .render(prompt, &context)
            .map_err(|e| ToolError::new("TemplateError", e.to_string()))?;
        Ok(json!(rendered))
    }
}
