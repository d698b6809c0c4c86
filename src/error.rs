//! Error types for the Halyard reconciliation engine.
//!
//! This module provides the error hierarchy for every fatal failure in the
//! reconciliation lifecycle: configuration, selector parsing, resource
//! providers and I/O. Failures of individual changes are not errors in this
//! sense: they are captured as data on a [`ChangeResult`](crate::model::ChangeResult).

use std::path::PathBuf;
use thiserror::Error;

use crate::model::Operation;

/// The main error type for the Halyard reconciliation engine.
#[derive(Debug, Error)]
pub enum HalyardError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Selector expression errors.
    #[error("Selector error: {0}")]
    Selector(#[from] SelectorError),

    /// Resource provider errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Two change handlers were registered for the same operation.
    #[error("Duplicate change handler for operation {operation}: '{existing}' and '{duplicate}'")]
    DuplicateHandler {
        /// The contested operation.
        operation: Operation,
        /// Name of the handler registered first.
        existing: String,
        /// Name of the handler registered second.
        duplicate: String,
    },

    /// No change handler is registered for an operation the caller requires.
    #[error("No change handler registered for operation {operation} on kind '{kind}'")]
    MissingHandler {
        /// Resource kind being reconciled.
        kind: String,
        /// The operation without a handler.
        operation: Operation,
    },

    /// No controller is registered for a resource kind.
    #[error("No controller registered for resource kind '{kind}'")]
    UnknownKind {
        /// The unhandled kind.
        kind: String,
    },
}

/// Selector expression errors.
#[derive(Debug, Error)]
pub enum SelectorError {
    /// The expression string could not be parsed.
    #[error("Invalid selector expression '{expression}': {message}")]
    Parse {
        /// The offending (sub)string.
        expression: String,
        /// Description of the problem.
        message: String,
    },

    /// The expression names a selector strategy that is not registered.
    #[error("Unknown selector '{name}' in expression '{expression}'")]
    UnknownSelector {
        /// The unknown selector name.
        name: String,
        /// The raw expression.
        expression: String,
    },

    /// The expression uses an operator that is not registered.
    #[error("Unknown operator '{operator}' in expression '{expression}'")]
    UnknownOperator {
        /// The unknown operator.
        operator: String,
        /// The raw expression.
        expression: String,
    },

    /// A pattern literal is not a valid regular expression.
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The pattern literal.
        pattern: String,
        /// Error reported by the regex engine.
        message: String,
    },
}

/// Resource provider errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The backing store is corrupted.
    #[error("Resource store is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Reading or writing the backing store failed.
    #[error("Resource store I/O failed: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },

    /// Serialization error.
    #[error("Resource serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// A resource expected to exist was not found.
    #[error("Resource not found: {kind}/{name}")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// A resource expected to be absent already exists.
    #[error("Resource already exists: {kind}/{name}")]
    AlreadyExists {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },
}

/// Result type alias for Halyard operations.
pub type Result<T> = std::result::Result<T, HalyardError>;

impl HalyardError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl SelectorError {
    /// Creates a parse error for the given expression.
    #[must_use]
    pub fn parse(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            expression: expression.into(),
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}
