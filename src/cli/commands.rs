//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::reconciler::ReconciliationMode;
use crate::selector::MatchingStrategy;

/// Halyard - Declarative resource reconciliation.
#[derive(Parser, Debug)]
#[command(name = "halyard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "HALYARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Selector expression restricting the resources (repeatable).
    #[arg(short, long = "selector", global = true)]
    pub selectors: Vec<String>,

    /// How selector expressions combine.
    #[arg(long, global = true)]
    pub matching: Option<MatchingStrategy>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration and the desired resource files.
    Validate {
        /// Desired resource files or directories.
        #[arg(short = 'f', long = "file")]
        files: Vec<PathBuf>,

        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// List the observed resources of a kind.
    Get {
        /// Resource kind (e.g. Topic).
        kind: String,
    },

    /// Compute and display the changes without applying them.
    Plan {
        /// Desired resource files or directories.
        #[arg(short = 'f', long = "file")]
        files: Vec<PathBuf>,

        /// Operations to consider.
        #[arg(long)]
        mode: Option<ReconciliationMode>,

        /// Delete observed resources missing from the desired files.
        #[arg(long)]
        delete_orphans: bool,

        /// Show field-level changes.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Apply the changes.
    Apply {
        /// Desired resource files or directories.
        #[arg(short = 'f', long = "file")]
        files: Vec<PathBuf>,

        /// Operations to apply.
        #[arg(long)]
        mode: Option<ReconciliationMode>,

        /// Delete observed resources missing from the desired files.
        #[arg(long)]
        delete_orphans: bool,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
