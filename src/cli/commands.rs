//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: execute a flow for one line or a JSONL file of lines
//! - validate: resolve every node of a flow
//! - tools: list available package tools

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// flowrun - run flows of package tools
#[derive(Parser, Debug)]
#[command(name = "flowrun")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Options shared by commands that resolve tools
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ToolOptions {
    /// Package tool manifest (repeatable, globs allowed)
    #[arg(short, long = "manifest")]
    pub manifests: Vec<String>,

    /// Connections file (YAML or JSON)
    #[arg(long)]
    pub connections: Option<PathBuf>,
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a flow
    Run {
        /// Path to the flow YAML
        flow: PathBuf,

        /// Inputs of a single line as a JSON object
        #[arg(short, long, conflicts_with = "inputs_file")]
        inputs: Option<String>,

        /// JSONL file with one line of inputs per row (bulk run)
        #[arg(long)]
        inputs_file: Option<PathBuf>,

        /// Bulk concurrency (defaults to the configured workers)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Fail on the first line error instead of recording it
        #[arg(long)]
        raise: bool,

        #[command(flatten)]
        tools: ToolOptions,
    },

    /// Resolve every node of a flow without running it
    Validate {
        /// Path to the flow YAML
        flow: PathBuf,

        #[command(flatten)]
        tools: ToolOptions,
    },

    /// List available package tools
    Tools {
        /// Package tool manifest (repeatable, globs allowed)
        #[arg(short, long = "manifest")]
        manifests: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "flowrun",
            "-v",
            "run",
            "flow.dag.yaml",
            "--inputs",
            r#"{"text": "hi"}"#,
            "-m",
            "a.yaml",
            "-m",
            "b/*.yaml",
            "--raise",
        ]);
        assert!(cli.is_verbose());
        match cli.command {
            Commands::Run {
                flow,
                inputs,
                raise,
                tools,
                ..
            } => {
                assert_eq!(flow, PathBuf::from("flow.dag.yaml"));
                assert_eq!(inputs.as_deref(), Some(r#"{"text": "hi"}"#));
                assert!(raise);
                assert_eq!(tools.manifests, vec!["a.yaml", "b/*.yaml"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_inputs_conflict() {
        let result = Cli::try_parse_from(["flowrun", "run", "f.yaml", "--inputs", "{}", "--inputs-file", "x.jsonl"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_tools() {
        let cli = Cli::parse_from(["flowrun", "--config", "c.yml", "tools"]);
        assert_eq!(cli.config, Some(PathBuf::from("c.yml")));
        assert!(matches!(cli.command, Commands::Tools { ref manifests } if manifests.is_empty()));
    }
}
