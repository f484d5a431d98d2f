//! Flow executor
//!
//! Resolves every node once at creation, then runs input rows ("lines")
//! through the nodes in dependency order.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;

use crate::domain::{ConnectionStore, Flow, FlowRunInfo, InputAssignment, LineResult, RunInfo};
use crate::error::{FlowError, Result};
use crate::id::generate_run_id;
use crate::tools::{PackageToolRegistry, ToolArgs, ToolProvider};

use super::resolver::{ResolvedTool, ToolResolver, resolve_all};

/// Executes a flow whose tools have all been resolved
pub struct FlowExecutor {
    flow: Flow,
    /// Resolved tools in execution order
    tools: Vec<ResolvedTool>,
    raise_ex: bool,
}

impl FlowExecutor {
    /// Resolve every node of `flow`; the first resolution failure is returned
    pub fn create(
        flow: Flow,
        connections: &ConnectionStore,
        registry: &dyn PackageToolRegistry,
        provider: &ToolProvider,
        raise_ex: bool,
    ) -> Result<Self> {
        let order = flow.execution_order()?;
        let resolver = ToolResolver::new(&flow.working_dir, connections, registry, provider);
        let mut resolved = resolve_all(&resolver, &flow.nodes)?;

        let tools: Vec<ResolvedTool> = order
            .iter()
            .filter_map(|&i| resolved.remove(&flow.nodes[i].name))
            .collect();
        log::info!("Resolved {} nodes", tools.len());

        Ok(Self { flow, tools, raise_ex })
    }

    /// Load a flow file and create an executor for it
    pub fn from_file(
        path: impl AsRef<Path>,
        connections: &ConnectionStore,
        registry: &dyn PackageToolRegistry,
        provider: &ToolProvider,
        raise_ex: bool,
    ) -> Result<Self> {
        let flow = Flow::load(path)?;
        Self::create(flow, connections, registry, provider, raise_ex)
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn raise_ex(&self) -> bool {
        self.raise_ex
    }

    /// Resolved tools in execution order
    pub fn tools(&self) -> &[ResolvedTool] {
        &self.tools
    }

    /// Run one line
    ///
    /// A failing line is returned as `Err` when the executor raises, otherwise
    /// it is recorded in the result with status `Failed`.
    pub fn exec_line(&self, inputs: BTreeMap<String, Value>) -> Result<LineResult> {
        let (result, error) = self.run_line(inputs, None);
        match error {
            Some(err) if self.raise_ex => Err(err),
            _ => Ok(result),
        }
    }

    /// Run many lines with at most `workers` in flight; results keep input order
    pub async fn exec_bulk(self: &Arc<Self>, lines: Vec<BTreeMap<String, Value>>, workers: usize) -> Vec<LineResult> {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        log::info!("Running {} lines with {} workers", lines.len(), workers.max(1));

        let mut handles = Vec::with_capacity(lines.len());
        for (index, inputs) in lines.into_iter().enumerate() {
            let executor = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let line_inputs = inputs.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                tokio::task::spawn_blocking(move || executor.run_line(inputs, Some(index)).0).await
            });
            handles.push((line_inputs, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (index, (inputs, handle)) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) | Err(e) => {
                    let err = FlowError::LineAborted {
                        index,
                        reason: e.to_string(),
                    };
                    log::error!("{}", err);
                    aborted_line(inputs, index, &err)
                }
            };
            results.push(result);
        }

        let failed = results.iter().filter(|r| !r.is_completed()).count();
        log::info!("Bulk run finished: {} lines, {} failed", results.len(), failed);
        results
    }

    fn run_line(&self, inputs: BTreeMap<String, Value>, index: Option<usize>) -> (LineResult, Option<FlowError>) {
        let run_id = generate_run_id();
        let mut run_info = FlowRunInfo::start(run_id.clone(), inputs.clone(), index);
        let mut node_run_infos = BTreeMap::new();

        let outcome = self
            .prepare_inputs(inputs)
            .and_then(|flow_inputs| self.run_nodes(&run_id, &flow_inputs, &mut node_run_infos));

        match outcome {
            Ok(output) => {
                log::debug!("Line {} completed", run_id);
                run_info.complete(output.clone());
                let result = LineResult {
                    output,
                    run_info,
                    node_run_infos,
                };
                (result, None)
            }
            Err(err) => {
                log::warn!("Line {} failed: {}", run_id, err);
                run_info.fail(&err);
                let result = LineResult {
                    output: BTreeMap::new(),
                    run_info,
                    node_run_infos,
                };
                (result, Some(err))
            }
        }
    }

    /// Apply defaults and declared types to the raw line inputs
    fn prepare_inputs(&self, mut inputs: BTreeMap<String, Value>) -> Result<BTreeMap<String, Value>> {
        for (name, definition) in &self.flow.inputs {
            let value = match inputs.get(name) {
                Some(value) => definition
                    .value_type
                    .convert(value)
                    .ok_or_else(|| FlowError::InputTypeMismatch {
                        input: name.clone(),
                        value: value.to_string(),
                        value_type: definition.value_type.to_string(),
                    })?,
                None => definition
                    .default
                    .clone()
                    .ok_or_else(|| FlowError::InputNotFound(name.clone()))?,
            };
            inputs.insert(name.clone(), value);
        }
        Ok(inputs)
    }

    fn run_nodes(
        &self,
        run_id: &str,
        flow_inputs: &BTreeMap<String, Value>,
        node_run_infos: &mut BTreeMap<String, RunInfo>,
    ) -> Result<BTreeMap<String, Value>> {
        let mut outputs: BTreeMap<String, Value> = BTreeMap::new();

        for tool in &self.tools {
            let name = &tool.node.name;
            let mut node_info = RunInfo::start(name, run_id);

            let result = runtime_args(tool, flow_inputs, &outputs).and_then(|args| {
                node_info.inputs = args.to_record();
                tool.callable.call(&args).map_err(|source| FlowError::ToolExecution {
                    node_name: name.clone(),
                    source,
                })
            });

            match result {
                Ok(output) => {
                    node_info.complete(output.clone());
                    node_run_infos.insert(name.clone(), node_info);
                    outputs.insert(name.clone(), output);
                }
                Err(err) => {
                    node_info.fail(&err);
                    node_run_infos.insert(name.clone(), node_info);
                    return Err(err);
                }
            }
        }

        self.flow
            .outputs
            .iter()
            .map(|(name, output)| lookup(&output.reference, flow_inputs, &outputs).map(|value| (name.clone(), value)))
            .collect()
    }
}

/// Bound arguments plus references resolved against this line
fn runtime_args(
    tool: &ResolvedTool,
    flow_inputs: &BTreeMap<String, Value>,
    outputs: &BTreeMap<String, Value>,
) -> Result<ToolArgs> {
    let mut args = tool.bound_args.clone();
    for (name, assignment) in &tool.node.inputs {
        if !assignment.is_literal() {
            args.insert_value(name.clone(), lookup(assignment, flow_inputs, outputs)?);
        }
    }
    Ok(args)
}

fn lookup(
    assignment: &InputAssignment,
    flow_inputs: &BTreeMap<String, Value>,
    outputs: &BTreeMap<String, Value>,
) -> Result<Value> {
    match assignment {
        InputAssignment::Literal(value) => Ok(value.clone()),
        InputAssignment::FlowInput(name) => flow_inputs
            .get(name)
            .cloned()
            .ok_or_else(|| FlowError::InputNotFound(name.clone())),
        InputAssignment::NodeOutput { node, path } => {
            let mut value = outputs
                .get(node)
                .ok_or_else(|| FlowError::InvalidReference(format!("Node '{}' has no output", node)))?;
            for segment in path {
                let next = match value {
                    Value::Object(map) => map.get(segment),
                    Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                    _ => None,
                };
                value = next.ok_or_else(|| {
                    FlowError::InvalidReference(format!(
                        "Output of node '{}' has no property '{}'",
                        node,
                        path.join(".")
                    ))
                })?;
            }
            Ok(value.clone())
        }
    }
}

fn aborted_line(inputs: BTreeMap<String, Value>, index: usize, err: &FlowError) -> LineResult {
    let mut run_info = FlowRunInfo::start(generate_run_id(), inputs, Some(index));
    run_info.fail(err);
    LineResult {
        output: BTreeMap::new(),
        run_info,
        node_run_infos: BTreeMap::new(),
    }
}
