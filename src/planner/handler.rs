//! Change handler contract.
//!
//! A handler applies batches of same-operation changes to a managed system.
//! It starts one task per change before returning, so the executor can join
//! them together and a slow call does not serialize the batch.

use std::collections::BTreeSet;
use std::fmt::Write;
use std::future::Future;

use tokio::task::JoinHandle;
use tracing::error;

use crate::model::{ChangeError, Operation, ResourceChange};

/// The pending outcome of one change.
#[derive(Debug)]
pub struct ChangeTask {
    state: TaskState,
}

#[derive(Debug)]
enum TaskState {
    Ready(Vec<ChangeError>),
    Spawned(JoinHandle<Vec<ChangeError>>),
}

impl ChangeTask {
    /// Starts `future` on the runtime and tracks its outcome.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Vec<ChangeError>> + Send + 'static,
    {
        Self {
            state: TaskState::Spawned(tokio::spawn(future)),
        }
    }

    /// A task that already finished with the given errors.
    #[must_use]
    pub const fn ready(errors: Vec<ChangeError>) -> Self {
        Self {
            state: TaskState::Ready(errors),
        }
    }

    /// A task that already finished without error.
    #[must_use]
    pub const fn completed() -> Self {
        Self::ready(Vec::new())
    }

    /// Waits for the task and returns the errors it reported.
    ///
    /// A task that panicked or was cancelled reports a single error.
    pub async fn join(self) -> Vec<ChangeError> {
        match self.state {
            TaskState::Ready(errors) => errors,
            TaskState::Spawned(handle) => match handle.await {
                Ok(errors) => errors,
                Err(e) if e.is_cancelled() => {
                    vec![ChangeError::new("change task was cancelled").with_code("CANCELLED")]
                }
                Err(e) => {
                    error!("Change task panicked: {e}");
                    vec![ChangeError::new(format!("change task panicked: {e}")).with_code("PANIC")]
                }
            },
        }
    }
}

/// A change handed back by a handler together with its running task.
#[derive(Debug)]
pub struct ChangeResponse {
    /// The change being applied.
    pub change: ResourceChange,
    /// Its pending outcome.
    pub task: ChangeTask,
}

impl ChangeResponse {
    /// Pairs a change with its task.
    #[must_use]
    pub const fn new(change: ResourceChange, task: ChangeTask) -> Self {
        Self { change, task }
    }
}

/// Applies changes of the operations it supports.
pub trait ChangeHandler: Send + Sync {
    /// Name used in logs and configuration errors.
    fn name(&self) -> &str;

    /// Operations this handler accepts.
    fn supported_operations(&self) -> BTreeSet<Operation>;

    /// Starts applying a batch of changes, one response per change.
    fn apply(&self, changes: Vec<ResourceChange>) -> Vec<ChangeResponse>;

    /// Describes what applying the change does.
    fn describe(&self, change: &ResourceChange) -> String {
        describe_change(change)
    }
}

/// Default textual description of a change.
#[must_use]
pub fn describe_change(change: &ResourceChange) -> String {
    let verb = match change.operation() {
        Operation::Create => "Create",
        Operation::Update => "Update",
        Operation::Delete => "Delete",
        Operation::None => "Keep",
        Operation::Ignore => "Ignore",
    };
    let mut description = format!("{verb} {} '{}'", change.kind(), change.name());

    let details: Vec<String> = change
        .state_changes()
        .iter()
        .filter(|c| c.operation() != Operation::None)
        .map(ToString::to_string)
        .collect();
    if !details.is_empty() && change.operation() != Operation::Delete {
        let _ = write!(description, " [{}]", details.join(", "));
    }
    description
}

/// Handles `None` changes: nothing to apply, every change succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneChangeHandler;

impl ChangeHandler for NoneChangeHandler {
    fn name(&self) -> &str {
        "none"
    }

    fn supported_operations(&self) -> BTreeSet<Operation> {
        BTreeSet::from([Operation::None])
    }

    fn apply(&self, changes: Vec<ResourceChange>) -> Vec<ChangeResponse> {
        changes
            .into_iter()
            .map(|change| ChangeResponse::new(change, ChangeTask::completed()))
            .collect()
    }
}
