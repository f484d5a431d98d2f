//! Tool System - package tool definitions, registries and implementations
//!
//! The registry describes which package tools exist, the provider holds the
//! code behind them, and the builtins module ships a few tools of its own.

pub mod builtins;
mod definition;
mod provider;
mod registry;

pub use definition::{InputDefinition, ToolDefinition, ToolType, ValueType};
pub use provider::{ArgValue, LoadedTool, PackageTool, ToolArgs, ToolProvider};
pub use registry::{ManifestRegistry, PackageToolRegistry};

pub use crate::error::ToolError;
