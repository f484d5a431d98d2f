//! Domain types for flowrun
//!
//! This module contains the core domain types:
//! - Flow: parsed flow definition with nodes and input assignments
//! - Connection: named credentials injected into tools
//! - RunInfo/LineResult: records produced by line execution

pub mod connection;
pub mod flow;
pub mod run_info;

pub use connection::{Connection, ConnectionStore};
pub use flow::{Flow, FlowInputDefinition, FlowOutputDefinition, InputAssignment, Node, ToolSource, ToolSourceType};
pub use run_info::{ErrorInfo, FlowRunInfo, LineResult, RunInfo, Status};
