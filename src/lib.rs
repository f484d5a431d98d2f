//! flowrun - A flow executor built around package tool resolution
//!
//! A flow is a graph of nodes, each invoking one tool. Before any input row
//! runs, every node's tool reference is resolved against a package tool
//! registry, loaded, and validated; failures surface as a two-level
//! [`error::ResolveToolError`] naming the node and the specific cause.

pub mod domain;
pub mod error;
pub mod executor;
pub mod id;
pub mod prompt;
pub mod tools;

pub use error::{FlowError, ResolveCause, ResolveToolError, Result};
pub use executor::FlowExecutor;
