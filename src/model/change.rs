//! Per-field and per-resource deltas.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::operation::Operation;
use super::resource::Resource;

/// Compares two values, tolerating a value and its string form.
///
/// Loosely-typed configuration sources often report `3` where the desired
/// state says `"3"` (or `true` / `"true"`). Values of the same type compare
/// structurally; values of different types compare through their string
/// coercion. `null` only equals `null`. Two integers compare exactly, a float
/// on either side compares numerically.
#[must_use]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(l), Value::Number(r)) => {
            if l.is_f64() || r.is_f64() {
                matches!((l.as_f64(), r.as_f64()), (Some(a), Some(b)) if a == b)
            } else {
                l == r
            }
        }
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(l), Value::Object(r)) => {
            l.len() == r.len()
                && l.iter()
                    .all(|(k, v)| r.get(k).is_some_and(|other| values_equal(v, other)))
        }
        (Value::String(l), Value::String(r)) => l == r,
        (Value::Bool(l), Value::Bool(r)) => l == r,
        _ => coerce_to_string(left) == coerce_to_string(right),
    }
}

/// String coercion used for cross-type comparison.
fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A single named before/after pair.
///
/// The operation is derived from the pair on construction and cannot be set
/// independently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    name: String,
    before: Option<Value>,
    after: Option<Value>,
    operation: Operation,
}

impl StateChange {
    /// Creates a state change, deriving its operation.
    #[must_use]
    pub fn new(name: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        let operation = Operation::of(before.as_ref(), after.as_ref());
        Self {
            name: name.into(),
            before,
            after,
            operation,
        }
    }

    /// Creates a state change for a value that did not exist before.
    #[must_use]
    pub fn created(name: impl Into<String>, after: Value) -> Self {
        Self::new(name, None, Some(after))
    }

    /// Creates a state change for a value that will no longer exist.
    #[must_use]
    pub fn deleted(name: impl Into<String>, before: Value) -> Self {
        Self::new(name, Some(before), None)
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Observed value, if any.
    #[must_use]
    pub const fn before(&self) -> Option<&Value> {
        self.before.as_ref()
    }

    /// Desired value, if any.
    #[must_use]
    pub const fn after(&self) -> Option<&Value> {
        self.after.as_ref()
    }

    /// Derived operation.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }
}

impl std::fmt::Display for StateChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |v: Option<&Value>| v.map_or_else(|| String::from("<none>"), Value::to_string);
        match self.operation {
            Operation::Create => write!(f, "+ {}: {}", self.name, show(self.after())),
            Operation::Delete => write!(f, "- {}: {}", self.name, show(self.before())),
            Operation::Update => write!(
                f,
                "~ {}: {} -> {}",
                self.name,
                show(self.before()),
                show(self.after())
            ),
            Operation::None | Operation::Ignore => {
                write!(f, "  {}: {}", self.name, show(self.after()))
            }
        }
    }
}

/// The operation and state changes computed for one resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceChangeSpec {
    operation: Operation,
    changes: Vec<StateChange>,
}

impl ResourceChangeSpec {
    /// Aggregates the state changes of a resource present on both sides.
    ///
    /// The operation is `None` iff every state change is `None`.
    #[must_use]
    pub fn from_changes(changes: Vec<StateChange>) -> Self {
        let operation = if changes.iter().all(|c| c.operation() == Operation::None) {
            Operation::None
        } else {
            Operation::Update
        };
        Self { operation, changes }
    }

    /// Spec for a resource that does not exist yet.
    #[must_use]
    pub const fn create(changes: Vec<StateChange>) -> Self {
        Self {
            operation: Operation::Create,
            changes,
        }
    }

    /// Spec for a resource that must be removed.
    #[must_use]
    pub const fn delete(changes: Vec<StateChange>) -> Self {
        Self {
            operation: Operation::Delete,
            changes,
        }
    }

    /// Effective operation.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// State changes, in computation order.
    #[must_use]
    pub fn changes(&self) -> &[StateChange] {
        &self.changes
    }
}

/// Identity of the resource a change applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeMetadata {
    /// Resource kind.
    pub kind: String,
    /// Resource name, unique within its kind.
    pub name: String,
    /// Labels carried over from the resource.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations carried over from the resource.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ChangeMetadata {
    /// Creates metadata with no labels or annotations.
    #[must_use]
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }
}

impl From<&Resource> for ChangeMetadata {
    fn from(resource: &Resource) -> Self {
        Self {
            kind: resource.kind.clone(),
            name: resource.metadata.name.clone(),
            labels: resource.metadata.labels.clone(),
            annotations: resource.metadata.annotations.clone(),
        }
    }
}

/// The unit dispatched to change handlers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceChange {
    /// Identity of the changed resource.
    pub metadata: ChangeMetadata,
    /// Computed delta.
    pub spec: ResourceChangeSpec,
}

impl ResourceChange {
    /// Creates a resource change.
    #[must_use]
    pub const fn new(metadata: ChangeMetadata, spec: ResourceChangeSpec) -> Self {
        Self { metadata, spec }
    }

    /// Effective operation of this change.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.spec.operation()
    }

    /// Resource kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.metadata.kind
    }

    /// Resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// State changes of this resource.
    #[must_use]
    pub fn state_changes(&self) -> &[StateChange] {
        self.spec.changes()
    }

    /// Looks up a state change by field name.
    #[must_use]
    pub fn state_change(&self, name: &str) -> Option<&StateChange> {
        self.spec.changes().iter().find(|c| c.name() == name)
    }
}

impl std::fmt::Display for ResourceChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.operation(), self.kind(), self.name())?;
        let changed: Vec<&str> = self
            .state_changes()
            .iter()
            .filter(|c| c.operation() != Operation::None)
            .map(StateChange::name)
            .collect();
        if !changed.is_empty() {
            write!(f, " ({})", changed.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_values_equal_same_type() {
        assert!(values_equal(&json!(3), &json!(3)));
        assert!(values_equal(&json!(3), &json!(3.0)));
        assert!(!values_equal(&json!("a"), &json!("b")));
        assert!(values_equal(&json!({"a": [1, 2]}), &json!({"a": [1, 2]})));
        assert!(!values_equal(&json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn test_values_equal_large_integers() {
        let low = json!(9_007_199_254_740_992_u64);
        let high = json!(9_007_199_254_740_993_u64);
        assert!(!values_equal(&low, &high));
        assert!(values_equal(&high, &json!(9_007_199_254_740_993_u64)));
        assert!(!values_equal(&json!(-9_007_199_254_740_993_i64), &json!(-9_007_199_254_740_992_i64)));
        assert_eq!(
            StateChange::new("offset", Some(low), Some(high)).operation(),
            Operation::Update
        );
    }

    #[test]
    fn test_values_equal_cross_type() {
        assert!(values_equal(&json!(3), &json!("3")));
        assert!(values_equal(&json!("3"), &json!(3)));
        assert!(values_equal(&json!(true), &json!("true")));
        assert!(values_equal(&json!({"retention": 1000}), &json!({"retention": "1000"})));
        assert!(!values_equal(&json!(3), &json!("4")));
        assert!(!values_equal(&Value::Null, &json!("null")));
    }

    #[test]
    fn test_state_change_derives_operation() {
        assert_eq!(StateChange::created("p", json!(1)).operation(), Operation::Create);
        assert_eq!(StateChange::deleted("p", json!(1)).operation(), Operation::Delete);
        assert_eq!(
            StateChange::new("p", Some(json!(3)), Some(json!("3"))).operation(),
            Operation::None
        );
        assert_eq!(
            StateChange::new("p", Some(json!(3)), Some(json!(6))).operation(),
            Operation::Update
        );
    }

    #[test]
    fn test_spec_aggregation() {
        let unchanged = ResourceChangeSpec::from_changes(vec![
            StateChange::new("a", Some(json!(1)), Some(json!(1))),
            StateChange::new("b", Some(json!("x")), Some(json!("x"))),
        ]);
        assert_eq!(unchanged.operation(), Operation::None);

        let changed = ResourceChangeSpec::from_changes(vec![
            StateChange::new("a", Some(json!(1)), Some(json!(1))),
            StateChange::created("c", json!(2)),
        ]);
        assert_eq!(changed.operation(), Operation::Update);
    }

    #[test]
    fn test_display() {
        let change = ResourceChange::new(
            ChangeMetadata::new("Topic", "orders"),
            ResourceChangeSpec::from_changes(vec![
                StateChange::new("partitions", Some(json!(3)), Some(json!(6))),
                StateChange::new("replicas", Some(json!(3)), Some(json!(3))),
            ]),
        );
        assert_eq!(change.to_string(), "UPDATE Topic/orders (partitions)");
        assert_eq!(
            change.state_change("partitions").map(ToString::to_string),
            Some(String::from("~ partitions: 3 -> 6"))
        );
    }
}
