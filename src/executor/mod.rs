//! Executor - tool resolution and line execution
//!
//! [`ToolResolver`] turns nodes into callables, [`FlowExecutor`] owns the
//! resolved tools and runs lines through them.

mod flow_executor;
mod resolver;

pub use flow_executor::FlowExecutor;
pub use resolver::{PROMPT_INPUT, ResolvedTool, ToolResolver, resolve_all};
