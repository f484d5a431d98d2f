//! CLI module for flowrun - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running and validating
//! flows and for listing package tools.

pub mod commands;

pub use commands::Cli;
