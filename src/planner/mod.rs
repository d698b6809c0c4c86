//! Planning and execution of resource changes.
//!
//! This module computes the changes converging observed resources to their
//! desired state and dispatches them to change handlers.

mod diff;
mod executor;
mod factory;
mod handler;

pub use diff::{KeyExtractor, ResourceChangeComputer};
pub use executor::ChangeExecutor;
pub use factory::{ChangeFactory, SpecChangeFactory, ValueChangeFactory};
pub use handler::{describe_change, ChangeHandler, ChangeResponse, ChangeTask, NoneChangeHandler};
