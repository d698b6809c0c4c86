//! Outcomes of executed (or planned) changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::change::ResourceChange;
use super::operation::Operation;

/// Outcome classification of one change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeStatus {
    /// Nothing needed to be done.
    Ok,
    /// The change was (or would be) applied.
    Changed,
    /// Applying the change reported at least one error.
    Failed,
}

/// A structured error reported while applying one change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeError {
    /// Human-readable message.
    pub message: String,
    /// Optional status or error code from the managed system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ChangeError {
    /// Creates an error with a message only.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Attaches a status or error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for ChangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Outcome of one change, produced exactly once by the executor.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeResult {
    /// The originating change.
    pub change: ResourceChange,
    /// Outcome classification.
    pub status: ChangeStatus,
    /// Handler-provided description, for plan and audit output.
    pub description: String,
    /// Errors reported by the handler; non-empty iff `status` is `Failed`.
    pub errors: Vec<ChangeError>,
    /// When the outcome was recorded.
    pub completed_at: DateTime<Utc>,
}

impl ChangeResult {
    /// Classifies a change from the errors its task reported.
    #[must_use]
    pub fn from_errors(change: ResourceChange, description: String, errors: Vec<ChangeError>) -> Self {
        let status = if change.operation() == Operation::None {
            ChangeStatus::Ok
        } else if errors.is_empty() {
            ChangeStatus::Changed
        } else {
            ChangeStatus::Failed
        };
        // Errors of an unchanged resource are not actionable.
        let errors = if status == ChangeStatus::Failed { errors } else { Vec::new() };
        Self {
            change,
            status,
            description,
            errors,
            completed_at: Utc::now(),
        }
    }

    /// Classifies a change that was only planned.
    #[must_use]
    pub fn planned(change: ResourceChange, description: String) -> Self {
        Self::from_errors(change, description, Vec::new())
    }

    /// Returns true if the change failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == ChangeStatus::Failed
    }
}

/// Counts of outcomes across one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    /// Resources already converged.
    pub ok: usize,
    /// Resources created, updated or deleted (or that would be).
    pub changed: usize,
    /// Resources whose change failed.
    pub failed: usize,
    /// Breakdown of changed resources: creations.
    pub created: usize,
    /// Breakdown of changed resources: updates.
    pub updated: usize,
    /// Breakdown of changed resources: deletions.
    pub deleted: usize,
}

impl ChangeSummary {
    /// Summarizes a set of results.
    #[must_use]
    pub fn of(results: &[ChangeResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            match r.status {
                ChangeStatus::Ok => acc.ok += 1,
                ChangeStatus::Failed => acc.failed += 1,
                ChangeStatus::Changed => {
                    acc.changed += 1;
                    match r.change.operation() {
                        Operation::Create => acc.created += 1,
                        Operation::Update => acc.updated += 1,
                        Operation::Delete => acc.deleted += 1,
                        Operation::None | Operation::Ignore => {}
                    }
                }
            }
            acc
        })
    }

    /// Total number of results.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.ok + self.changed + self.failed
    }

    /// Returns true if no change failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl std::fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} changes: {} created, {} updated, {} deleted, {} unchanged, {} failed",
            self.total(),
            self.created,
            self.updated,
            self.deleted,
            self.ok,
            self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeMetadata, ResourceChangeSpec, StateChange};
    use serde_json::json;

    fn change(spec: ResourceChangeSpec) -> ResourceChange {
        ResourceChange::new(ChangeMetadata::new("Topic", "orders"), spec)
    }

    #[test]
    fn test_classification() {
        let create = change(ResourceChangeSpec::create(vec![StateChange::created("p", json!(1))]));
        let ok = ChangeResult::from_errors(create.clone(), String::new(), vec![]);
        assert_eq!(ok.status, ChangeStatus::Changed);

        let failed = ChangeResult::from_errors(create, String::new(), vec![ChangeError::new("boom")]);
        assert_eq!(failed.status, ChangeStatus::Failed);
        assert_eq!(failed.errors.len(), 1);

        let none = change(ResourceChangeSpec::from_changes(vec![]));
        let unchanged = ChangeResult::from_errors(none, String::new(), vec![ChangeError::new("x")]);
        assert_eq!(unchanged.status, ChangeStatus::Ok);
        assert!(unchanged.errors.is_empty());
    }

    #[test]
    fn test_summary() {
        let results = vec![
            ChangeResult::planned(
                change(ResourceChangeSpec::create(vec![])),
                String::from("create"),
            ),
            ChangeResult::planned(change(ResourceChangeSpec::from_changes(vec![])), String::new()),
            ChangeResult::from_errors(
                change(ResourceChangeSpec::delete(vec![])),
                String::new(),
                vec![ChangeError::new("denied").with_code("403")],
            ),
        ];
        let summary = ChangeSummary::of(&results);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.ok, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_success());
        assert_eq!(results[2].errors[0].to_string(), "[403] denied");
    }
}
