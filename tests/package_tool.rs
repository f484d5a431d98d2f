//! Package tool resolution integration tests
//!
//! Runs the flows under `tests/fixtures` end to end: registry lookup, tool
//! loading, prompt integration and line execution.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flowrun::domain::{Connection, ConnectionStore, Status};
use flowrun::error::{ResolveCause, Result, ToolError};
use flowrun::executor::FlowExecutor;
use flowrun::tools::{ManifestRegistry, PackageTool, ToolArgs, ToolDefinition, ToolProvider};
use flowrun::FlowError;
use serde_json::{Value, json};

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn package_tool_folder(name: &str) -> PathBuf {
    fixtures().join("package_tools").join(name)
}

fn flow_file(folder: &Path) -> PathBuf {
    folder.join("flow.dag.yaml")
}

fn package_tool_definition(folder: &Path) -> ManifestRegistry {
    ManifestRegistry::from_file(folder.join("package_tool_definition.yaml")).unwrap()
}

fn dev_connections() -> ConnectionStore {
    ConnectionStore::from_file(fixtures().join("connections.yaml")).unwrap()
}

fn sample_inputs(folder: &Path) -> Vec<BTreeMap<String, Value>> {
    let content = std::fs::read_to_string(folder.join("samples.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

fn resolve_error(err: FlowError) -> flowrun::ResolveToolError {
    match err {
        FlowError::ResolveTool(e) => e,
        other => panic!("expected a resolve error, got {:?}", other),
    }
}

#[test]
fn test_executor_package_tool_with_conn() -> Result<()> {
    let folder = package_tool_folder("tool_with_connection");
    let registry = package_tool_definition(&folder);
    let (name, secret) = ("dummy_name", "dummy_secret");
    let connections = ConnectionStore::from_value(json!({
        "test_conn": {
            "type": "TestConnection",
            "value": {"name": name, "secret": secret},
        }
    }))?;

    let executor = FlowExecutor::from_file(
        flow_file(&folder),
        &connections,
        &registry,
        &ToolProvider::with_builtins(),
        true,
    )?;
    let flow_result = executor.exec_line(BTreeMap::new())?;

    assert_eq!(flow_result.run_info.status, Status::Completed);
    assert_eq!(flow_result.node_run_infos.len(), 1);
    for run_info in flow_result.node_run_infos.values() {
        assert_eq!(run_info.status, Status::Completed);
        assert_eq!(run_info.output, Some(json!(format!("{}{}", name, secret))));
    }
    Ok(())
}

#[test]
fn test_executor_package_with_prompt_tool() -> Result<()> {
    let folder = package_tool_folder("custom_llm_tool");
    let registry = package_tool_definition(&folder);
    let executor = FlowExecutor::from_file(
        flow_file(&folder),
        &dev_connections(),
        &registry,
        &ToolProvider::with_builtins(),
        true,
    )?;

    for inputs in sample_inputs(&folder) {
        let text = inputs["text"].as_str().unwrap_or_default().to_string();
        let line_result = executor.exec_line(inputs)?;
        assert_eq!(line_result.run_info.status, Status::Completed, "Got failure for input {}", text);
        assert_eq!(
            line_result.output["output"].as_str().map(str::trim),
            Some(format!("Translate the following text into French: {}", text).as_str())
        );
    }
    Ok(())
}

#[test]
fn test_custom_llm_tool_with_duplicated_inputs() {
    let folder = package_tool_folder("custom_llm_tool_with_duplicated_inputs");
    let registry = package_tool_definition(&folder);
    let err = FlowExecutor::from_file(
        flow_file(&folder),
        &dev_connections(),
        &registry,
        &ToolProvider::with_builtins(),
        false,
    )
    .err()
    .unwrap();

    let err = resolve_error(err);
    assert!(matches!(err.inner_exception(), ResolveCause::NodeInputValidation(_)));
    assert_eq!(
        err.message(),
        "Tool load failed in 'custom_llm_tool_with_duplicated_inputs': (NodeInputValidationError) \
         Invalid inputs {'api'} in prompt template of node custom_llm_tool_with_duplicated_inputs. \
         These inputs are duplicated with the inputs of custom llm tool."
    );
}

#[test]
fn test_package_tool_not_found() {
    let cases = [
        (
            "wrong_tool_in_package_tools",
            "Tool load failed in 'search_by_text': (PackageToolNotFoundError) \
             Package tool 'promptflow.tools.serpapi.SerpAPI.search_11' is not found in the current environment. \
             All available package tools are: \
             ['promptflow.tools.azure_content_safety.AzureContentSafety.analyze_text', \
             'promptflow.tools.azure_detect.AzureDetect.get_language'].",
        ),
        (
            "wrong_package_in_package_tools",
            "Tool load failed in 'search_by_text': (PackageToolNotFoundError) \
             Package tool 'promptflow.tools.serpapi11.SerpAPI.search' is not found in the current environment. \
             All available package tools are: \
             ['promptflow.tools.azure_content_safety.AzureContentSafety.analyze_text', \
             'promptflow.tools.azure_detect.AzureDetect.get_language'].",
        ),
    ];

    let collect_package_tools = |_keys: Option<&BTreeSet<String>>| {
        BTreeMap::from([
            (
                "promptflow.tools.azure_content_safety.AzureContentSafety.analyze_text".to_string(),
                None::<ToolDefinition>,
            ),
            ("promptflow.tools.azure_detect.AzureDetect.get_language".to_string(), None),
        ])
    };

    for (flow_folder, error_message) in cases {
        let folder = fixtures().join("wrong_flows").join(flow_folder);
        let err = FlowExecutor::from_file(
            flow_file(&folder),
            &dev_connections(),
            &collect_package_tools,
            &ToolProvider::with_builtins(),
            false,
        )
        .err()
        .unwrap();

        let err = resolve_error(err);
        assert!(matches!(err.inner_exception(), ResolveCause::PackageToolNotFound(_)));
        assert_eq!(err.message(), error_message);
    }
}

#[test]
fn test_package_tool_load_error() {
    let folder = package_tool_folder("tool_with_init_error");
    let registry = package_tool_definition(&folder);
    let mut provider = ToolProvider::new();
    provider.register_class(
        "my_tool_package.tool_with_init_error.TestLoadErrorTool.tool",
        &["name"],
        |_args: &ToolArgs| -> std::result::Result<Arc<dyn PackageTool>, ToolError> {
            Err(ToolError::msg("Tool load error."))
        },
    );

    let err = FlowExecutor::from_file(flow_file(&folder), &dev_connections(), &registry, &provider, false)
        .err()
        .unwrap();

    let err = resolve_error(err);
    assert!(matches!(err.inner_exception(), ResolveCause::ToolLoad(_)));
    assert_eq!(
        err.message(),
        "Tool load failed in 'tool_with_init_error': \
         (ToolLoadError) Failed to load package tool 'Tool with init error': (Exception) Tool load error."
    );
}

#[test]
fn test_connection_not_found() {
    let folder = package_tool_folder("tool_with_connection");
    let registry = package_tool_definition(&folder);
    let err = FlowExecutor::from_file(
        flow_file(&folder),
        &ConnectionStore::new(),
        &registry,
        &ToolProvider::with_builtins(),
        false,
    )
    .err()
    .unwrap();

    let err = resolve_error(err);
    assert_eq!(
        err.message(),
        "Tool load failed in 'tool_with_conn': (ConnectionNotFound) Connection 'test_conn' not found."
    );
}

#[test]
fn test_exec_line_is_repeatable() -> Result<()> {
    let folder = package_tool_folder("tool_with_connection");
    let registry = package_tool_definition(&folder);
    let mut connections = ConnectionStore::new();
    connections.insert(
        Connection::new("test_conn", "TestConnection")
            .with_value("name", "a")
            .with_value("secret", "b"),
    );
    let executor = FlowExecutor::from_file(
        flow_file(&folder),
        &connections,
        &registry,
        &ToolProvider::with_builtins(),
        true,
    )?;

    let results: Vec<_> = (0..3).map(|_| executor.exec_line(BTreeMap::new())).collect::<Result<_>>()?;
    let run_ids: BTreeSet<&str> = results.iter().map(|r| r.run_info.run_id.as_str()).collect();
    assert_eq!(run_ids.len(), 3);
    for result in &results {
        assert_eq!(result.output["output"], json!("ab"));
    }
    Ok(())
}

#[tokio::test]
async fn test_exec_bulk_with_prompt_tool() -> Result<()> {
    let folder = package_tool_folder("custom_llm_tool");
    let registry = package_tool_definition(&folder);
    let executor = Arc::new(FlowExecutor::from_file(
        flow_file(&folder),
        &dev_connections(),
        &registry,
        &ToolProvider::with_builtins(),
        false,
    )?);

    let mut lines = sample_inputs(&folder);
    lines.push(BTreeMap::new());
    let results = executor.exec_bulk(lines, 2).await;

    assert_eq!(results.len(), 4);
    assert!(results[..3].iter().all(|r| r.is_completed()));
    let failed = &results[3];
    assert_eq!(failed.run_info.status, Status::Failed);
    assert_eq!(failed.run_info.index, Some(3));
    assert_eq!(
        failed.run_info.error.as_ref().map(|e| e.message.as_str()),
        Some("The value for flow input 'text' is not provided in input data.")
    );
    Ok(())
}
