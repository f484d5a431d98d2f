//! Prompt System - Template loading and rendering
//!
//! This module provides functionality for loading prompt templates from a flow
//! directory, finding their free variables and rendering them with Handlebars.

mod loader;
mod render;

pub use loader::PromptLoader;
pub use render::{PromptRenderer, PromptTemplate, template_variables};
