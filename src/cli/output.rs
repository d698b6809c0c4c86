//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::model::{ChangeResult, ChangeStatus, ChangeSummary, Operation, Resource};
use crate::reconciler::DriftReport;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Change row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Description")]
    description: String,
}

/// Resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Labels")]
    labels: String,
    #[tabled(rename = "Spec")]
    spec: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats change results, followed by their summary.
    #[must_use]
    pub fn format_results(&self, results: &[ChangeResult], detailed: bool) -> String {
        let summary = ChangeSummary::of(results);
        match self.format {
            OutputFormat::Json => to_json(&ResultsJson { summary, results }),
            OutputFormat::Text => Self::format_results_text(results, &summary, detailed),
        }
    }

    /// Formats results as text.
    fn format_results_text(results: &[ChangeResult], summary: &ChangeSummary, detailed: bool) -> String {
        if results.is_empty() {
            return format!("{} No resources selected.\n", "✓".green());
        }

        let mut output = String::new();
        let rows: Vec<ChangeRow> = results
            .iter()
            .map(|r| ChangeRow {
                operation: Self::format_operation(r.change.operation()),
                resource: format!("{}/{}", r.change.kind(), r.change.name()),
                status: Self::format_status(r.status),
                description: Self::truncate(&r.description, 60),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            for result in results.iter().filter(|r| r.change.operation().is_mutating()) {
                let _ = writeln!(output, "\n{} {}/{}", result.change.operation(), result.change.kind(), result.change.name());
                for change in result.change.state_changes() {
                    if change.operation() != Operation::None {
                        let _ = writeln!(output, "  {change}");
                    }
                }
            }
        }

        let failed: Vec<&ChangeResult> = results.iter().filter(|r| r.is_failed()).collect();
        if !failed.is_empty() {
            let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
            for result in failed {
                for error in &result.errors {
                    let _ = writeln!(
                        output,
                        "   - {}/{}: {error}",
                        result.change.kind(),
                        result.change.name()
                    );
                }
            }
        }

        let _ = write!(
            output,
            "\nSummary: {} to create, {} to update, {} to delete ({} ok, {} changed, {} failed)\n",
            summary.created.to_string().green(),
            summary.updated.to_string().yellow(),
            summary.deleted.to_string().red(),
            summary.ok,
            summary.changed,
            summary.failed
        );
        output
    }

    /// Formats observed resources.
    #[must_use]
    pub fn format_resources(&self, resources: &[Resource]) -> String {
        match self.format {
            OutputFormat::Json => to_json(&resources),
            OutputFormat::Text => {
                if resources.is_empty() {
                    return String::from("No resources found.\n");
                }
                let rows: Vec<ResourceRow> = resources
                    .iter()
                    .map(|r| ResourceRow {
                        kind: r.kind.clone(),
                        name: r.metadata.name.clone(),
                        labels: r
                            .metadata
                            .labels
                            .iter()
                            .map(|(k, v)| format!("{k}={v}"))
                            .collect::<Vec<_>>()
                            .join(","),
                        spec: Self::truncate(&serde_json::Value::Object(r.spec.clone()).to_string(), 50),
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                if report.is_converged() {
                    format!("{} No drift detected - state is converged.\n", "✓".green())
                } else {
                    let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
                    for resource in &report.drifted_resources {
                        let _ = writeln!(output, "   - {resource}");
                    }
                    let _ = write!(
                        output,
                        "\n{}/{} resources have drifted.\n",
                        report.drifted_resources.len(),
                        report.total_resources
                    );
                    output
                }
            }
        }
    }

    /// Formats a validation outcome.
    #[must_use]
    pub fn format_validation(
        &self,
        result: &ValidationResult,
        resource_count: usize,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({
                "valid": result.is_valid(),
                "resources": resource_count,
                "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "warnings": result.warnings,
            })),
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid!\n", "✓".green())
                } else {
                    let mut text = format!("{} Configuration is invalid:\n", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(text, "   - {error}");
                    }
                    text
                };
                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                let _ = writeln!(output, "\n   Desired resources: {resource_count}");
                output
            }
        }
    }

    /// Formats an operation with color.
    fn format_operation(operation: Operation) -> String {
        match operation {
            Operation::Create => "+create".green().to_string(),
            Operation::Update => "~update".yellow().to_string(),
            Operation::Delete => "-delete".red().to_string(),
            Operation::None => "none".dimmed().to_string(),
            Operation::Ignore => "ignore".dimmed().to_string(),
        }
    }

    /// Formats a change status with color.
    fn format_status(status: ChangeStatus) -> String {
        match status {
            ChangeStatus::Ok => "ok".dimmed().to_string(),
            ChangeStatus::Changed => "changed".green().to_string(),
            ChangeStatus::Failed => "failed".red().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

// JSON serialization helpers

#[derive(Serialize)]
struct ResultsJson<'a> {
    summary: ChangeSummary,
    results: &'a [ChangeResult],
}
