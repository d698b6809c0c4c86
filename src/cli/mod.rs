//! CLI module for the Halyard reconciliation tool.
//!
//! This module provides the command-line interface for planning and
//! applying desired resources against the local resource store.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat};
pub use output::OutputFormatter;
