//! Run records for lines and nodes
//!
//! Every `exec_line` call produces one [`FlowRunInfo`] plus one [`RunInfo`] per
//! node that ran, bundled in a [`LineResult`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FlowError;
use crate::id::node_run_id;

/// Status of a flow or node run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl Status {
    /// Check if the run has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Error recorded on a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
}

impl From<&FlowError> for ErrorInfo {
    fn from(error: &FlowError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Record of one node run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub node: String,
    pub flow_run_id: String,
    pub run_id: String,
    pub status: Status,
    pub inputs: BTreeMap<String, Value>,
    pub output: Option<Value>,
    pub error: Option<ErrorInfo>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RunInfo {
    /// Start a node run
    pub fn start(node: &str, flow_run_id: &str) -> Self {
        Self {
            node: node.to_string(),
            flow_run_id: flow_run_id.to_string(),
            run_id: node_run_id(flow_run_id, node),
            status: Status::Running,
            inputs: BTreeMap::new(),
            output: None,
            error: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn complete(&mut self, output: Value) {
        self.status = Status::Completed;
        self.output = Some(output);
        self.end_time = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &FlowError) {
        self.status = Status::Failed;
        self.error = Some(ErrorInfo::from(error));
        self.end_time = Some(Utc::now());
    }
}

/// Record of one line (flow run)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRunInfo {
    pub run_id: String,
    pub status: Status,
    pub inputs: BTreeMap<String, Value>,
    pub output: Option<BTreeMap<String, Value>>,
    pub error: Option<ErrorInfo>,
    /// Position within a bulk run
    pub index: Option<usize>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl FlowRunInfo {
    pub fn start(run_id: impl Into<String>, inputs: BTreeMap<String, Value>, index: Option<usize>) -> Self {
        Self {
            run_id: run_id.into(),
            status: Status::Running,
            inputs,
            output: None,
            error: None,
            index,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn complete(&mut self, output: BTreeMap<String, Value>) {
        self.status = Status::Completed;
        self.output = Some(output);
        self.end_time = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &FlowError) {
        self.status = Status::Failed;
        self.error = Some(ErrorInfo::from(error));
        self.end_time = Some(Utc::now());
    }
}

/// Result of running one input row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineResult {
    /// Flow outputs (empty when the line failed)
    pub output: BTreeMap<String, Value>,
    pub run_info: FlowRunInfo,
    /// Node runs keyed by node name
    pub node_run_infos: BTreeMap<String, RunInfo>,
}

impl LineResult {
    pub fn is_completed(&self) -> bool {
        self.run_info.status == Status::Completed
    }
}
