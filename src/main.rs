use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use log::info;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use flowrun::domain::{ConnectionStore, LineResult};
use flowrun::executor::FlowExecutor;
use flowrun::tools::{ManifestRegistry, PackageToolRegistry, ToolProvider, builtins};
use serde_json::Value;

mod cli;
mod config;

use cli::Cli;
use cli::commands::{Commands, ToolOptions};
use config::Config;

fn setup_logging(cli: &Cli, config: &Config) {
    let level = if cli.is_verbose() { "debug" } else { config.log_level() };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Commands::Run {
            flow,
            inputs,
            inputs_file,
            workers,
            raise,
            tools,
        } => {
            let executor = create_executor(flow, tools, config, *raise || config.raise_on_error)?;
            match inputs_file {
                Some(path) => {
                    let lines = read_lines(path)?;
                    run_bulk(executor, lines, workers.unwrap_or(config.workers))
                }
                None => run_single(&executor, inputs.as_deref()),
            }
        }
        Commands::Validate { flow, tools } => {
            let executor = create_executor(flow, tools, config, false)?;
            println!(
                "{} {} ({} nodes resolved)",
                "Valid:".green(),
                flow.display(),
                executor.tools().len()
            );
            Ok(())
        }
        Commands::Tools { manifests } => {
            let registry = build_registry(manifests, config)?;
            let tools = registry.collect(None);
            for (identifier, definition) in &tools {
                match definition {
                    Some(definition) => println!("{}  {}", identifier.cyan(), definition.name),
                    None => println!("{}", identifier.cyan()),
                }
            }
            info!("Listed {} package tools", tools.len());
            Ok(())
        }
    }
}

fn build_registry(manifests: &[String], config: &Config) -> Result<ManifestRegistry> {
    let mut registry = builtins::registry();
    for pattern in config.manifests.iter().chain(manifests) {
        let count = registry
            .load_glob(pattern)
            .context(format!("Failed to load manifests from {}", pattern))?;
        if count == 0 {
            log::warn!("No package tools found for {}", pattern);
        }
    }
    Ok(registry)
}

fn load_connections(tools: &ToolOptions, config: &Config) -> Result<ConnectionStore> {
    match tools.connections.as_ref().or(config.connections.as_ref()) {
        Some(path) => ConnectionStore::from_file(path)
            .context(format!("Failed to load connections from {}", path.display())),
        None => Ok(ConnectionStore::new()),
    }
}

fn create_executor(flow: &Path, tools: &ToolOptions, config: &Config, raise_ex: bool) -> Result<FlowExecutor> {
    let registry = build_registry(&tools.manifests, config)?;
    let connections = load_connections(tools, config)?;
    let provider = ToolProvider::with_builtins();

    FlowExecutor::from_file(flow, &connections, &registry, &provider, raise_ex)
        .context(format!("Failed to create executor for {}", flow.display()))
}

fn read_lines(path: &Path) -> Result<Vec<BTreeMap<String, Value>>> {
    let content = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| serde_json::from_str(line).context(format!("Invalid JSON on line {} of {}", i + 1, path.display())))
        .collect()
}

fn run_single(executor: &FlowExecutor, inputs: Option<&str>) -> Result<()> {
    let inputs: BTreeMap<String, Value> = match inputs {
        Some(raw) => serde_json::from_str(raw).context("Inputs must be a JSON object")?,
        None => BTreeMap::new(),
    };

    let result = executor.exec_line(inputs)?;
    print_result(&result)?;
    if !result.is_completed() {
        bail!("Line failed");
    }
    Ok(())
}

fn run_bulk(executor: FlowExecutor, lines: Vec<BTreeMap<String, Value>>, workers: usize) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    let executor = Arc::new(executor);
    let results = runtime.block_on(executor.exec_bulk(lines, workers));

    for result in &results {
        println!("{}", serde_json::to_string(result)?);
    }

    let failed = results.iter().filter(|r| !r.is_completed()).count();
    if failed > 0 {
        eprintln!("{} {} of {} lines failed", "Warning:".yellow(), failed, results.len());
    }
    Ok(())
}

fn print_result(result: &LineResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    if let Some(error) = &result.run_info.error {
        eprintln!("{} {}", "Error:".red(), error.message);
    }
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&cli, &config);
    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config)
}
