//! Reconciler for converging managed systems to their desired state.
//!
//! This module ties the pieces together: for every resource kind it collects
//! the observed resources, computes the changes against the desired ones and
//! hands the eligible changes to the kind's executor.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::{ConfigError, Result};
use crate::model::{ChangeResult, ChangeSummary, DesiredState, Operation, Resource, ResourceChange};
use crate::planner::{ChangeExecutor, ChangeHandler, NoneChangeHandler, ResourceChangeComputer, SpecChangeFactory};
use crate::provider::{LocalResourceStore, ResourceCollector};
use crate::selector::Selectors;

/// Which kinds of changes a reconciliation run may apply.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationMode {
    /// Only create missing resources.
    Create,
    /// Create missing resources and update drifted ones.
    Update,
    /// Only delete resources.
    Delete,
    /// Create, update and delete.
    #[default]
    Full,
}

impl ReconciliationMode {
    /// Mutating operations this mode allows.
    #[must_use]
    pub fn operations(self) -> BTreeSet<Operation> {
        match self {
            Self::Create => BTreeSet::from([Operation::Create]),
            Self::Update => BTreeSet::from([Operation::Create, Operation::Update]),
            Self::Delete => BTreeSet::from([Operation::Delete]),
            Self::Full => BTreeSet::from([Operation::Create, Operation::Update, Operation::Delete]),
        }
    }

    /// Returns true if changes of `operation` take part in a run.
    ///
    /// `None` changes are always eligible so that plans list converged
    /// resources.
    #[must_use]
    pub fn is_eligible(self, operation: Operation) -> bool {
        operation == Operation::None || self.operations().contains(&operation)
    }
}

impl std::fmt::Display for ReconciliationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Full => "full",
        };
        f.write_str(name)
    }
}

/// Per-run options.
#[derive(Debug)]
pub struct ReconciliationContext {
    /// Describe changes without applying them.
    pub dry_run: bool,
    /// Delete observed resources that have no desired counterpart.
    pub delete_orphans: bool,
    /// Restricts the resources taking part, on both sides.
    pub selectors: Selectors,
    /// Identifier attached to the run's tracing span.
    pub run_id: Uuid,
}

impl ReconciliationContext {
    /// Creates a context for a real run with a fresh run id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dry_run: false,
            delete_orphans: false,
            selectors: Selectors::all(),
            run_id: Uuid::new_v4(),
        }
    }

    /// Sets dry-run.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets orphan deletion.
    #[must_use]
    pub const fn with_delete_orphans(mut self, delete_orphans: bool) -> Self {
        self.delete_orphans = delete_orphans;
        self
    }

    /// Sets the selectors.
    #[must_use]
    pub fn with_selectors(mut self, selectors: Selectors) -> Self {
        self.selectors = selectors;
        self
    }
}

impl Default for ReconciliationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Collector, computer and executor for one resource kind.
#[derive(Debug)]
pub struct ResourceController {
    collector: Arc<dyn ResourceCollector>,
    computer: ResourceChangeComputer<Resource, String>,
    executor: ChangeExecutor,
}

impl ResourceController {
    /// Creates a controller.
    #[must_use]
    pub fn new(
        collector: Arc<dyn ResourceCollector>,
        computer: ResourceChangeComputer<Resource, String>,
        executor: ChangeExecutor,
    ) -> Self {
        Self {
            collector,
            computer,
            executor,
        }
    }

    /// Controller reading and writing a [`LocalResourceStore`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store's handlers conflict.
    pub fn local(
        store: &Arc<LocalResourceStore>,
        factory: SpecChangeFactory,
        timeout: Option<Duration>,
    ) -> std::result::Result<Self, ConfigError> {
        let mut handlers = store.handlers(timeout);
        handlers.push(Arc::new(NoneChangeHandler) as Arc<dyn ChangeHandler>);
        Ok(Self::new(
            Arc::clone(store) as Arc<dyn ResourceCollector>,
            ResourceChangeComputer::for_resources(factory),
            ChangeExecutor::new(handlers)?,
        ))
    }

    /// The controller's executor.
    #[must_use]
    pub const fn executor(&self) -> &ChangeExecutor {
        &self.executor
    }
}

/// Reconciles desired resources of every registered kind.
#[derive(Debug, Default)]
pub struct Reconciler {
    controllers: BTreeMap<String, ResourceController>,
}

impl Reconciler {
    /// Creates a reconciler with no controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the controller for a kind, replacing any previous one.
    #[must_use]
    pub fn with_controller(mut self, kind: impl Into<String>, controller: ResourceController) -> Self {
        self.controllers.insert(kind.into(), controller);
        self
    }

    /// Registered kinds.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.controllers.keys().map(String::as_str)
    }

    /// Computes the eligible changes without executing them.
    ///
    /// # Errors
    ///
    /// Returns an error if a kind has no controller, a controller lacks a
    /// handler the mode needs, or observed resources cannot be collected.
    pub async fn diff(
        &self,
        desired: Vec<Resource>,
        mode: ReconciliationMode,
        ctx: &ReconciliationContext,
    ) -> Result<Vec<ResourceChange>> {
        let planned = self.plan(desired, mode, ctx).await?;
        Ok(planned.into_iter().flat_map(|(_, changes)| changes).collect())
    }

    /// Converges the managed systems to `desired`.
    ///
    /// Results of all kinds are returned in kind order. Failures of single
    /// changes are reported as failed results; only configuration and
    /// collection problems are errors.
    ///
    /// # Errors
    ///
    /// Returns an error if a kind has no controller, a controller lacks a
    /// handler the mode needs, or observed resources cannot be collected.
    pub async fn reconcile(
        &self,
        desired: Vec<Resource>,
        mode: ReconciliationMode,
        ctx: &ReconciliationContext,
    ) -> Result<Vec<ChangeResult>> {
        let span = info_span!(
            "reconcile",
            run_id = %ctx.run_id,
            mode = %mode,
            dry_run = ctx.dry_run
        );

        async move {
            info!("Starting reconciliation of {} desired resource(s)", desired.len());
            let planned = self.plan(desired, mode, ctx).await?;

            let mut results = Vec::new();
            for (controller, changes) in planned {
                results.extend(controller.executor.execute(changes, ctx.dry_run).await);
            }

            let summary = ChangeSummary::of(&results);
            info!("Reconciliation finished: {summary}");
            Ok(results)
        }
        .instrument(span)
        .await
    }

    /// Validates the run and computes eligible changes per controller.
    async fn plan(
        &self,
        desired: Vec<Resource>,
        mode: ReconciliationMode,
        ctx: &ReconciliationContext,
    ) -> Result<Vec<(&ResourceController, Vec<ResourceChange>)>> {
        let (ignored, desired): (Vec<Resource>, Vec<Resource>) =
            desired.into_iter().partition(Resource::is_ignored);
        let ignored: BTreeSet<(String, String)> = ignored
            .into_iter()
            .map(|r| (r.kind, r.metadata.name))
            .collect();
        if !ignored.is_empty() {
            debug!("Ignoring {} resource(s)", ignored.len());
        }

        let mut by_kind: BTreeMap<String, Vec<Resource>> = BTreeMap::new();
        for resource in ctx.selectors.filter(desired) {
            by_kind.entry(resource.kind.clone()).or_default().push(resource);
        }

        let mut controllers = Vec::with_capacity(by_kind.len());
        for kind in by_kind.keys() {
            let controller = self
                .controllers
                .get(kind)
                .ok_or_else(|| ConfigError::UnknownKind { kind: kind.clone() })?;
            if let Some(operation) = mode
                .operations()
                .into_iter()
                .find(|op| !controller.executor.supports(*op))
            {
                return Err(ConfigError::MissingHandler {
                    kind: kind.clone(),
                    operation,
                }
                .into());
            }
            controllers.push(controller);
        }

        let mut planned = Vec::with_capacity(by_kind.len());
        for ((kind, resources), controller) in by_kind.into_iter().zip(controllers) {
            let observed: Vec<Resource> = ctx
                .selectors
                .filter(controller.collector.list(&kind).await?)
                .into_iter()
                .filter(|r| !ignored.contains(&(kind.clone(), r.metadata.name.clone())))
                .collect();
            let desired: Vec<DesiredState<Resource>> =
                resources.into_iter().map(DesiredState::from).collect();

            let mut changes = controller
                .computer
                .compute_changes(&observed, &desired, ctx.delete_orphans);
            let computed = changes.len();
            changes.retain(|c| mode.is_eligible(c.operation()));
            debug!(
                kind = kind.as_str(),
                "{} change(s) computed, {} eligible in {mode} mode",
                computed,
                changes.len()
            );
            planned.push((controller, changes));
        }
        Ok(planned)
    }
}

/// Report of drift detection.
#[derive(Debug, Serialize)]
pub struct DriftReport {
    /// Whether drift was detected.
    pub has_drift: bool,
    /// Changes needed to converge, as `OPERATION Kind/name (fields)`.
    pub drifted_resources: Vec<String>,
    /// Number of resources compared.
    pub total_resources: usize,
}

impl DriftReport {
    /// Builds a report from computed changes.
    #[must_use]
    pub fn from_changes(changes: &[ResourceChange]) -> Self {
        let drifted_resources: Vec<String> = changes
            .iter()
            .filter(|c| c.operation().is_mutating())
            .map(ToString::to_string)
            .collect();
        Self {
            has_drift: !drifted_resources.is_empty(),
            drifted_resources,
            total_resources: changes.len(),
        }
    }

    /// Returns true if the state is converged (no drift).
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_drift {
            writeln!(f, "Drift detected:")?;
            for resource in &self.drifted_resources {
                writeln!(f, "  - {resource}")?;
            }
        } else {
            write!(f, "No drift detected - state is converged")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HalyardError;
    use crate::model::{ChangeStatus, ANNOTATION_DELETE, ANNOTATION_IGNORE};
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup(observed: Vec<Resource>) -> (Reconciler, Arc<LocalResourceStore>, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(LocalResourceStore::new(temp_dir.path().join("resources.json")));
        for resource in observed {
            store.create(resource).await.expect("seed failed");
        }
        let controller =
            ResourceController::local(&store, SpecChangeFactory::new(), None).expect("controller");
        (Reconciler::new().with_controller("Topic", controller), store, temp_dir)
    }

    fn topic(name: &str, partitions: i64) -> Resource {
        Resource::new("Topic", name).with_spec("partitions", json!(partitions))
    }

    #[test]
    fn test_mode_eligibility() {
        assert!(ReconciliationMode::Create.is_eligible(Operation::Create));
        assert!(!ReconciliationMode::Create.is_eligible(Operation::Update));
        assert!(ReconciliationMode::Update.is_eligible(Operation::Update));
        assert!(!ReconciliationMode::Update.is_eligible(Operation::Delete));
        assert!(ReconciliationMode::Delete.is_eligible(Operation::None));
        assert!(!ReconciliationMode::Full.is_eligible(Operation::Ignore));
    }

    #[tokio::test]
    async fn test_topic_scenario() {
        let (reconciler, store, _temp) = setup(vec![topic("topicA", 3)]).await;

        let results = reconciler
            .reconcile(
                vec![topic("topicA", 6), topic("topicB", 1)],
                ReconciliationMode::Full,
                &ReconciliationContext::new().with_delete_orphans(true),
            )
            .await
            .expect("reconcile failed");

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == ChangeStatus::Changed));
        assert_eq!(
            store.list("Topic").await.expect("list failed"),
            vec![topic("topicA", 6), topic("topicB", 1)]
        );
    }

    #[tokio::test]
    async fn test_empty_desired_configs_keep_observed_entries() {
        let compacted = Resource::new("Topic", "t").with_spec("configs", json!({"cleanup.policy": "compact"}));
        let desired = vec![Resource::new("Topic", "t").with_spec("configs", json!({}))];
        let (reconciler, store, _temp) = setup(vec![compacted.clone()]).await;

        let results = reconciler
            .reconcile(desired.clone(), ReconciliationMode::Full, &ReconciliationContext::new())
            .await
            .expect("reconcile failed");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].change.operation(), Operation::None);
        assert_eq!(results[0].status, ChangeStatus::Ok);
        assert_eq!(store.list("Topic").await.expect("list failed"), vec![compacted]);

        // Pruning orphan entries empties the object and converges in one run
        let factory = SpecChangeFactory::new().with_delete_orphan_entries(true);
        let pruning = Reconciler::new().with_controller(
            "Topic",
            ResourceController::local(&store, factory, None).expect("controller"),
        );
        for expected in [ChangeStatus::Changed, ChangeStatus::Ok] {
            let results = pruning
                .reconcile(desired.clone(), ReconciliationMode::Full, &ReconciliationContext::new())
                .await
                .expect("reconcile failed");
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].status, expected);
        }
        assert_eq!(store.list("Topic").await.expect("list failed"), desired);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_store_untouched() {
        let (reconciler, store, _temp) = setup(vec![topic("topicA", 3)]).await;

        let results = reconciler
            .reconcile(
                vec![topic("topicA", 6)],
                ReconciliationMode::Full,
                &ReconciliationContext::new().with_dry_run(true),
            )
            .await
            .expect("reconcile failed");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ChangeStatus::Changed);
        assert_eq!(store.list("Topic").await.expect("list failed"), vec![topic("topicA", 3)]);
    }

    #[tokio::test]
    async fn test_mode_filters_changes() {
        let (reconciler, _store, _temp) = setup(vec![topic("topicA", 3), topic("old", 1)]).await;
        let ctx = ReconciliationContext::new().with_delete_orphans(true);
        let desired = vec![topic("topicA", 6), topic("topicB", 1)];

        let create_only = reconciler
            .diff(desired.clone(), ReconciliationMode::Create, &ctx)
            .await
            .expect("diff failed");
        assert_eq!(create_only.len(), 1);
        assert_eq!(create_only[0].name(), "topicB");

        let full = reconciler
            .diff(desired, ReconciliationMode::Full, &ctx)
            .await
            .expect("diff failed");
        let operations: Vec<Operation> = full.iter().map(ResourceChange::operation).collect();
        assert_eq!(
            operations,
            vec![Operation::Delete, Operation::Update, Operation::Create]
        );
    }

    #[tokio::test]
    async fn test_ignored_and_marked_resources() {
        let (reconciler, store, _temp) = setup(vec![topic("keep", 3), topic("drop", 1)]).await;

        let desired = vec![
            topic("keep", 9).with_annotation(ANNOTATION_IGNORE, "true"),
            topic("drop", 1).with_annotation(ANNOTATION_DELETE, "true"),
        ];
        let results = reconciler
            .reconcile(
                desired,
                ReconciliationMode::Full,
                &ReconciliationContext::new().with_delete_orphans(true),
            )
            .await
            .expect("reconcile failed");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].change.operation(), Operation::Delete);
        assert_eq!(store.list("Topic").await.expect("list failed"), vec![topic("keep", 3)]);
    }

    #[tokio::test]
    async fn test_selectors_restrict_both_sides() {
        let (reconciler, store, _temp) = setup(vec![topic("orders", 3), topic("audit", 1)]).await;
        let ctx = ReconciliationContext::new()
            .with_delete_orphans(true)
            .with_selectors(Selectors::parse(&["metadata.name Matches orders.*"]).expect("selector"));

        let results = reconciler
            .reconcile(vec![topic("orders", 6)], ReconciliationMode::Full, &ctx)
            .await
            .expect("reconcile failed");

        assert_eq!(results.len(), 1);
        assert_eq!(
            store.list("Topic").await.expect("list failed"),
            vec![topic("audit", 1), topic("orders", 6)]
        );
    }

    #[tokio::test]
    async fn test_configuration_errors() {
        let (reconciler, _store, _temp) = setup(Vec::new()).await;
        let err = reconciler
            .reconcile(
                vec![Resource::new("Schema", "orders-value")],
                ReconciliationMode::Full,
                &ReconciliationContext::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HalyardError::Config(ConfigError::UnknownKind { .. })));

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store: Arc<dyn ResourceCollector> =
            Arc::new(LocalResourceStore::new(temp_dir.path().join("resources.json")));
        let none_only: Vec<Arc<dyn ChangeHandler>> = vec![Arc::new(NoneChangeHandler)];
        let controller = ResourceController::new(
            store,
            ResourceChangeComputer::for_resources(SpecChangeFactory::new()),
            ChangeExecutor::new(none_only).expect("executor"),
        );
        let reconciler = Reconciler::new().with_controller("Topic", controller);
        let err = reconciler
            .reconcile(vec![topic("a", 1)], ReconciliationMode::Update, &ReconciliationContext::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HalyardError::Config(ConfigError::MissingHandler {
                operation: Operation::Create,
                ..
            })
        ));
    }

    #[test]
    fn test_drift_report() {
        let report = DriftReport::from_changes(&[]);
        assert!(report.is_converged());
        assert_eq!(report.to_string(), "No drift detected - state is converged");
    }
}
