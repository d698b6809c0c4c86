//! Change model for the reconciliation pipeline.
//!
//! This module defines the value types flowing through reconciliation:
//! resources and their desired state, the per-field and per-resource deltas
//! computed by the planner, and the outcomes produced by the executor.

mod change;
mod operation;
mod resource;
mod result;

pub use change::{values_equal, ChangeMetadata, ResourceChange, ResourceChangeSpec, StateChange};
pub use operation::Operation;
pub use resource::{DesiredState, ObjectMeta, Resource, ANNOTATION_DELETE, ANNOTATION_IGNORE};
pub use result::{ChangeError, ChangeResult, ChangeStatus, ChangeSummary};
