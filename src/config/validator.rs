//! Configuration validation.
//!
//! This module checks a parsed configuration for values that would only fail
//! later, in the middle of a run, and collects non-fatal warnings.

use crate::error::{ConfigError, HalyardError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{HalyardConfig, ReconcileConfig};
use crate::reconciler::ReconciliationMode;
use crate::selector::SelectorCompiler;

/// Validator for Halyard configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Compiler used to check selector expressions.
    compiler: SelectorCompiler,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a validator using the default selector registries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a custom selector compiler, so custom strategies and operators
    /// validate.
    #[must_use]
    pub fn with_compiler(mut self, compiler: SelectorCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any was found.
    pub fn validate(&self, config: &HalyardConfig) -> Result<ValidationResult> {
        let mut result = self.check(config);
        for warning in &result.warnings {
            debug!("Configuration warning: {warning}");
        }

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = result.errors.swap_remove(0);
            Err(HalyardError::Config(ConfigError::ValidationError {
                message: first_error.message,
                field: Some(first_error.field),
            }))
        }
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, config: &HalyardConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if config.store.path.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("store.path"),
                message: String::from("Store path cannot be empty"),
            });
        }

        self.validate_reconcile(&config.reconcile, &mut result);
        result
    }

    /// Validates reconciliation settings.
    fn validate_reconcile(&self, reconcile: &ReconcileConfig, result: &mut ValidationResult) {
        for (index, expression) in reconcile.selectors.iter().enumerate() {
            if let Err(e) = self.compiler.compile(&[expression]) {
                result.errors.push(ValidationError {
                    field: format!("reconcile.selectors[{index}]"),
                    message: e.to_string(),
                });
            }
        }

        if reconcile.operation_timeout_secs == Some(0) {
            result.errors.push(ValidationError {
                field: String::from("reconcile.operation_timeout_secs"),
                message: String::from("Operation timeout must be at least 1 second"),
            });
        }

        let mut seen = HashSet::new();
        for (index, kind) in reconcile.kinds.iter().enumerate() {
            if !is_valid_kind(kind) {
                result.errors.push(ValidationError {
                    field: format!("reconcile.kinds[{index}]"),
                    message: format!(
                        "Kind '{kind}' is invalid. Must start with an uppercase letter and be alphanumeric."
                    ),
                });
            } else if !seen.insert(kind.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("reconcile.kinds[{index}]"),
                    message: format!("Duplicate kind: {kind}"),
                });
            }
        }

        let deletes = reconcile.mode.operations().contains(&crate::model::Operation::Delete);
        if reconcile.delete_orphans && !deletes {
            result.warnings.push(format!(
                "delete_orphans has no effect in {} mode",
                reconcile.mode
            ));
        }
        if reconcile.delete_orphan_entries
            && !matches!(reconcile.mode, ReconciliationMode::Update | ReconciliationMode::Full)
        {
            result.warnings.push(format!(
                "delete_orphan_entries has no effect in {} mode",
                reconcile.mode
            ));
        }
    }
}

/// Kinds are `CamelCase` identifiers.
fn is_valid_kind(kind: &str) -> bool {
    let mut chars = kind.chars();
    chars.next().is_some_and(|c| c.is_ascii_uppercase()) && chars.all(|c| c.is_ascii_alphanumeric())
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
