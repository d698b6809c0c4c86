// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Halyard
//!
//! A declarative resource reconciliation engine.
//!
//! ## Overview
//!
//! Halyard converges a managed system (topics, schemas, ACLs, quotas, ...)
//! to a desired state written as YAML resources:
//!
//! - Select the resources taking part with textual selector expressions
//! - Compute keyed, field-level changes between observed and desired state
//! - Dispatch the changes to pluggable handlers, one per operation
//! - Report a per-change outcome: unchanged, changed or failed
//!
//! ## Architecture
//!
//! 1. **Selection**: [`selector`] filters resources on both sides
//! 2. **Computation**: [`planner::ResourceChangeComputer`] diffs observed and
//!    desired resources into [`model::ResourceChange`]s
//! 3. **Execution**: [`planner::ChangeExecutor`] groups changes by operation
//!    and joins the handlers' tasks
//!
//! The [`reconciler`] wires the three steps per resource kind.
//!
//! ## Modules
//!
//! - [`model`]: Resources, changes and results
//! - [`selector`]: Selector expressions, operators and property accessors
//! - [`planner`]: Change computation and execution
//! - [`provider`]: Resource collectors and the local resource store
//! - [`reconciler`]: Reconciliation engine
//! - [`config`]: Configuration parsing, validation and resource loading
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! kind: Topic
//! metadata:
//!   name: orders
//!   labels:
//!     team: payments
//! spec:
//!   partitions: 6
//!   configs:
//!     retention.ms: "604800000"
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod planner;
pub mod provider;
pub mod reconciler;
pub mod selector;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, HalyardConfig, ResourceLoader};
pub use error::{HalyardError, Result};
pub use model::{ChangeResult, ChangeStatus, Operation, Resource, ResourceChange};
pub use planner::{ChangeExecutor, ChangeHandler, ResourceChangeComputer};
pub use provider::{LocalResourceStore, ResourceCollector};
pub use reconciler::{ReconciliationContext, ReconciliationMode, Reconciler, ResourceController};
pub use selector::{Selectors, SelectorCompiler};
