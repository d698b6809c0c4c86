//! Change executor for applying computed changes.
//!
//! This module dispatches changes to the handler registered for their
//! operation, one batch per operation, and classifies every outcome.
//! Failures stay attached to the change that produced them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::error::ConfigError;
use crate::model::{ChangeError, ChangeResult, ChangeStatus, Operation, ResourceChange};

use super::handler::{ChangeHandler, ChangeResponse};

/// Executor dispatching changes to change handlers.
pub struct ChangeExecutor {
    /// One handler per operation.
    handlers: BTreeMap<Operation, Arc<dyn ChangeHandler>>,
}

impl ChangeExecutor {
    /// Builds the operation registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateHandler`] if two handlers support the
    /// same operation.
    pub fn new(
        handlers: impl IntoIterator<Item = Arc<dyn ChangeHandler>>,
    ) -> Result<Self, ConfigError> {
        let mut registry: BTreeMap<Operation, Arc<dyn ChangeHandler>> = BTreeMap::new();
        for handler in handlers {
            for operation in handler.supported_operations() {
                if let Some(existing) = registry.get(&operation) {
                    return Err(ConfigError::DuplicateHandler {
                        operation,
                        existing: existing.name().to_string(),
                        duplicate: handler.name().to_string(),
                    });
                }
                registry.insert(operation, Arc::clone(&handler));
            }
        }
        debug!("Change executor supports {:?}", registry.keys().collect::<Vec<_>>());
        Ok(Self { handlers: registry })
    }

    /// Returns true if a handler is registered for the operation.
    #[must_use]
    pub fn supports(&self, operation: Operation) -> bool {
        self.handlers.contains_key(&operation)
    }

    /// Operations with a registered handler.
    #[must_use]
    pub fn operations(&self) -> BTreeSet<Operation> {
        self.handlers.keys().copied().collect()
    }

    /// Executes (or, with `dry_run`, only describes) the changes.
    ///
    /// Changes whose operation has no handler are dropped from the result
    /// with a warning. In a real run, operation groups are processed in
    /// [`Operation`] order (create, update, delete, none, ignore); the tasks
    /// of one group run concurrently and are all joined before the next group
    /// starts.
    pub async fn execute(&self, changes: Vec<ResourceChange>, dry_run: bool) -> Vec<ChangeResult> {
        let mut groups: BTreeMap<Operation, Vec<ResourceChange>> = BTreeMap::new();
        for change in changes {
            if self.supports(change.operation()) {
                groups.entry(change.operation()).or_default().push(change);
            } else {
                warn!(
                    kind = change.kind(),
                    name = change.name(),
                    operation = %change.operation(),
                    "No change handler registered for operation, dropping change"
                );
            }
        }

        if dry_run {
            return self.describe_all(groups);
        }

        let mut results = Vec::new();
        for (operation, batch) in groups {
            let Some(handler) = self.handlers.get(&operation) else {
                continue;
            };
            results.extend(Self::execute_group(handler.as_ref(), operation, batch).await);
        }
        results
    }

    /// Classifies every change without running handlers.
    fn describe_all(&self, groups: BTreeMap<Operation, Vec<ResourceChange>>) -> Vec<ChangeResult> {
        groups
            .into_iter()
            .filter_map(|(operation, batch)| self.handlers.get(&operation).map(|h| (h, batch)))
            .flat_map(|(handler, batch)| {
                batch.into_iter().map(move |change| {
                    let description = handler.describe(&change);
                    ChangeResult::planned(change, description)
                })
            })
            .collect()
    }

    /// Runs one operation group through its handler and joins every task.
    async fn execute_group(
        handler: &dyn ChangeHandler,
        operation: Operation,
        batch: Vec<ResourceChange>,
    ) -> Vec<ChangeResult> {
        info!(
            "Applying {} {} change(s) with handler '{}'",
            batch.len(),
            operation,
            handler.name()
        );

        let mut pending = batch.clone();
        let responses = handler.apply(batch);

        let mut joins = Vec::with_capacity(pending.len());
        for ChangeResponse { change, task } in responses {
            // A response only counts once, and only for a change it was given.
            let Some(pos) = pending.iter().position(|c| c == &change) else {
                error!(
                    kind = change.kind(),
                    name = change.name(),
                    "Handler '{}' returned an unexpected or duplicate response, dropping it",
                    handler.name()
                );
                continue;
            };
            pending.swap_remove(pos);
            let description = handler.describe(&change);
            joins.push(async move {
                let errors = task.join().await;
                ChangeResult::from_errors(change, description, errors)
            });
        }
        let mut results = join_all(joins).await;

        for change in pending {
            error!(
                kind = change.kind(),
                name = change.name(),
                "Handler '{}' returned no response for change",
                handler.name()
            );
            let description = handler.describe(&change);
            results.push(ChangeResult::from_errors(
                change,
                description,
                vec![ChangeError::new("handler returned no response for this change")],
            ));
        }

        for result in &results {
            match result.status {
                ChangeStatus::Failed => warn!(
                    kind = result.change.kind(),
                    name = result.change.name(),
                    errors = result.errors.len(),
                    "Change failed: {}",
                    result.description
                ),
                ChangeStatus::Changed => info!("{}", result.description),
                ChangeStatus::Ok => debug!("{}", result.description),
            }
        }
        results
    }
}

impl std::fmt::Debug for ChangeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.handlers.iter().map(|(op, h)| (op, h.name())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeMetadata, ResourceChangeSpec, StateChange};
    use crate::planner::{ChangeTask, NoneChangeHandler};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records calls and fails changes whose name starts with `fail`.
    #[derive(Default)]
    struct RecordingHandler {
        operations: BTreeSet<Operation>,
        applied: AtomicUsize,
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl RecordingHandler {
        fn for_ops(ops: &[Operation]) -> Arc<Self> {
            Arc::new(Self {
                operations: ops.iter().copied().collect(),
                ..Self::default()
            })
        }
    }

    impl ChangeHandler for RecordingHandler {
        fn name(&self) -> &str {
            "recording"
        }

        fn supported_operations(&self) -> BTreeSet<Operation> {
            self.operations.clone()
        }

        fn apply(&self, changes: Vec<ResourceChange>) -> Vec<ChangeResponse> {
            self.applied.fetch_add(changes.len(), Ordering::SeqCst);
            self.batches
                .lock()
                .unwrap()
                .push(changes.iter().map(|c| c.name().to_string()).collect());
            changes
                .into_iter()
                .map(|change| {
                    let fail = change.name().starts_with("fail");
                    let panic = change.name().starts_with("panic");
                    let task = ChangeTask::spawn(async move {
                        if panic {
                            panic!("handler bug");
                        }
                        if fail {
                            vec![ChangeError::new("rejected by broker")]
                        } else {
                            vec![]
                        }
                    });
                    ChangeResponse::new(change, task)
                })
                .collect()
        }
    }

    fn change(name: &str, operation: Operation) -> ResourceChange {
        let spec = match operation {
            Operation::Create => ResourceChangeSpec::create(vec![StateChange::created("p", json!(1))]),
            Operation::Delete => ResourceChangeSpec::delete(vec![StateChange::deleted("p", json!(1))]),
            Operation::Update => ResourceChangeSpec::from_changes(vec![StateChange::new(
                "p",
                Some(json!(1)),
                Some(json!(2)),
            )]),
            Operation::None | Operation::Ignore => ResourceChangeSpec::from_changes(vec![]),
        };
        ResourceChange::new(ChangeMetadata::new("Topic", name), spec)
    }

    fn executor(handler: &Arc<RecordingHandler>) -> ChangeExecutor {
        let handlers: Vec<Arc<dyn ChangeHandler>> = vec![
            Arc::clone(handler) as Arc<dyn ChangeHandler>,
            Arc::new(NoneChangeHandler),
        ];
        ChangeExecutor::new(handlers).unwrap()
    }

    #[test]
    fn test_duplicate_handler_is_error() {
        let handlers: Vec<Arc<dyn ChangeHandler>> = vec![
            RecordingHandler::for_ops(&[Operation::Create, Operation::Update]),
            RecordingHandler::for_ops(&[Operation::Update]),
        ];
        let err = ChangeExecutor::new(handlers).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DuplicateHandler {
                operation: Operation::Update,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dry_run_never_applies() {
        let handler = RecordingHandler::for_ops(&[Operation::Create, Operation::Update]);
        let executor = executor(&handler);

        let results = executor
            .execute(
                vec![
                    change("a", Operation::Create),
                    change("b", Operation::None),
                    change("c", Operation::Delete),
                    change("d", Operation::Update),
                ],
                true,
            )
            .await;

        assert_eq!(handler.applied.load(Ordering::SeqCst), 0);
        assert_eq!(results.len(), 3);
        for result in &results {
            let expected = if result.change.operation() == Operation::None {
                ChangeStatus::Ok
            } else {
                ChangeStatus::Changed
            };
            assert_eq!(result.status, expected);
            assert!(!result.description.is_empty());
        }
        assert!(results.iter().all(|r| r.change.name() != "c"));
    }

    #[tokio::test]
    async fn test_real_run_classifies_and_isolates_failures() {
        let handler = RecordingHandler::for_ops(&[Operation::Create, Operation::Update]);
        let executor = executor(&handler);

        let results = executor
            .execute(
                vec![
                    change("ok", Operation::Create),
                    change("fail-1", Operation::Create),
                    change("panic-1", Operation::Update),
                    change("fine", Operation::Update),
                    change("same", Operation::None),
                    change("orphan", Operation::Delete),
                ],
                false,
            )
            .await;

        assert_eq!(results.len(), 5);
        let status = |name: &str| {
            results
                .iter()
                .find(|r| r.change.name() == name)
                .map(|r| (r.status, r.errors.len()))
        };
        assert_eq!(status("ok"), Some((ChangeStatus::Changed, 0)));
        assert_eq!(status("fail-1"), Some((ChangeStatus::Failed, 1)));
        assert_eq!(status("panic-1"), Some((ChangeStatus::Failed, 1)));
        assert_eq!(status("fine"), Some((ChangeStatus::Changed, 0)));
        assert_eq!(status("same"), Some((ChangeStatus::Ok, 0)));
        assert_eq!(status("orphan"), None);
    }

    #[tokio::test]
    async fn test_groups_run_in_operation_order() {
        let handler = RecordingHandler::for_ops(&[Operation::Create, Operation::Update, Operation::Delete]);
        let executor = executor(&handler);

        executor
            .execute(
                vec![
                    change("d1", Operation::Delete),
                    change("u1", Operation::Update),
                    change("c1", Operation::Create),
                    change("c2", Operation::Create),
                ],
                false,
            )
            .await;

        let batches = handler.batches.lock().unwrap().clone();
        assert_eq!(
            batches,
            vec![
                vec![String::from("c1"), String::from("c2")],
                vec![String::from("u1")],
                vec![String::from("d1")],
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_response_is_reported() {
        struct Forgetful;
        impl ChangeHandler for Forgetful {
            fn name(&self) -> &str {
                "forgetful"
            }
            fn supported_operations(&self) -> BTreeSet<Operation> {
                BTreeSet::from([Operation::Create])
            }
            fn apply(&self, _changes: Vec<ResourceChange>) -> Vec<ChangeResponse> {
                Vec::new()
            }
        }

        let handlers: Vec<Arc<dyn ChangeHandler>> = vec![Arc::new(Forgetful)];
        let executor = ChangeExecutor::new(handlers).unwrap();
        let results = executor.execute(vec![change("a", Operation::Create)], false).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ChangeStatus::Failed);
    }

    #[tokio::test]
    async fn test_extra_responses_are_dropped() {
        struct Repeating;
        impl ChangeHandler for Repeating {
            fn name(&self) -> &str {
                "repeating"
            }
            fn supported_operations(&self) -> BTreeSet<Operation> {
                BTreeSet::from([Operation::Create])
            }
            fn apply(&self, changes: Vec<ResourceChange>) -> Vec<ChangeResponse> {
                let stranger = change("stranger", Operation::Create);
                changes
                    .into_iter()
                    .chain(std::iter::once(stranger))
                    .flat_map(|change| {
                        let first = ChangeResponse::new(change.clone(), ChangeTask::completed());
                        let second = ChangeResponse::new(change, ChangeTask::completed());
                        [first, second]
                    })
                    .collect()
            }
        }

        let handlers: Vec<Arc<dyn ChangeHandler>> = vec![Arc::new(Repeating)];
        let executor = ChangeExecutor::new(handlers).unwrap();
        let results = executor.execute(vec![change("a", Operation::Create)], false).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].change.name(), "a");
        assert_eq!(results[0].status, ChangeStatus::Changed);
    }
}
