//! Change factories: value-level diffs of matched items.
//!
//! A factory knows how to describe an item (its change metadata) and how to
//! compare two versions of it field by field. The provided `create_for_*`
//! methods assemble those pieces into [`ResourceChange`]s.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::model::{ChangeMetadata, Resource, ResourceChange, ResourceChangeSpec, StateChange};

/// Builds resource changes for items of type `T` keyed by `K`.
pub trait ChangeFactory<K, T>: Send + Sync {
    /// Identity of the change for `item`.
    fn metadata(&self, key: &K, item: &T) -> ChangeMetadata;

    /// Field-level changes between two versions of an item.
    ///
    /// `before` is `None` for a creation, `after` is `None` for a deletion.
    fn state_changes(&self, before: Option<&T>, after: Option<&T>) -> Vec<StateChange>;

    /// Change for an item that does not exist yet.
    fn create_for_create(&self, key: &K, after: &T) -> ResourceChange {
        ResourceChange::new(
            self.metadata(key, after),
            ResourceChangeSpec::create(self.state_changes(None, Some(after))),
        )
    }

    /// Change for an item present on both sides; `None` when nothing differs.
    fn create_for_update(&self, key: &K, before: &T, after: &T) -> ResourceChange {
        ResourceChange::new(
            self.metadata(key, after),
            ResourceChangeSpec::from_changes(self.state_changes(Some(before), Some(after))),
        )
    }

    /// Change for an item that must be removed.
    fn create_for_delete(&self, key: &K, before: &T) -> ResourceChange {
        ResourceChange::new(
            self.metadata(key, before),
            ResourceChangeSpec::delete(self.state_changes(Some(before), None)),
        )
    }

    /// Change recording that an item is converged.
    fn create_for_none(&self, key: &K, item: &T) -> ResourceChange {
        self.create_for_update(key, item, item)
    }
}

/// Diffs resources entry by entry over their spec.
///
/// Top-level spec entries become one state change each. Entries holding a
/// non-empty object are expanded one level, so `configs: {retention.ms: ..}`
/// yields a state change named `configs.retention.ms`. Top-level spec keys
/// must therefore not contain dots, see [`SpecChangeFactory::check_spec_keys`].
///
/// A desired empty object stands for "no entries": it does not replace the
/// observed entries under that key unless orphan entries are deleted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecChangeFactory {
    delete_orphan_entries: bool,
}

impl SpecChangeFactory {
    /// Creates a factory that leaves observed-only entries alone.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            delete_orphan_entries: false,
        }
    }

    /// Sets whether entries present only on the observed side are deleted.
    #[must_use]
    pub const fn with_delete_orphan_entries(mut self, delete_orphan_entries: bool) -> Self {
        self.delete_orphan_entries = delete_orphan_entries;
        self
    }

    /// Rejects top-level spec keys containing a dot.
    ///
    /// Such a key could not be told apart from a nested entry once flattened.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first dotted key.
    pub fn check_spec_keys(resource: &Resource) -> Result<(), ConfigError> {
        match resource.spec.keys().find(|key| key.contains('.')) {
            Some(key) => Err(ConfigError::validation(
                format!(
                    "{}/{}: top-level spec key '{key}' must not contain '.', nest it under an object",
                    resource.kind,
                    resource.name()
                ),
                format!("spec.{key}"),
            )),
            None => Ok(()),
        }
    }

    /// Flattens a spec into named entries.
    #[must_use]
    pub fn entries(spec: &Map<String, Value>) -> BTreeMap<String, Value> {
        let mut entries = BTreeMap::new();
        for (key, value) in spec {
            match value {
                Value::Object(nested) if !nested.is_empty() => {
                    for (entry, nested_value) in nested {
                        entries.insert(format!("{key}.{entry}"), nested_value.clone());
                    }
                }
                other => {
                    entries.insert(key.clone(), other.clone());
                }
            }
        }
        entries
    }
}

impl ChangeFactory<String, Resource> for SpecChangeFactory {
    fn metadata(&self, _key: &String, item: &Resource) -> ChangeMetadata {
        ChangeMetadata::from(item)
    }

    fn state_changes(&self, before: Option<&Resource>, after: Option<&Resource>) -> Vec<StateChange> {
        let before_entries = before.map(|r| Self::entries(&r.spec)).unwrap_or_default();
        let mut after_entries = after.map(|r| Self::entries(&r.spec)).unwrap_or_default();
        if !self.delete_orphan_entries {
            after_entries.retain(|name, value| {
                !(is_empty_object(value) && has_nested_entries(&before_entries, name))
            });
        }
        let whole_resource_deleted = after.is_none();

        let mut names: Vec<&String> = before_entries.keys().chain(after_entries.keys()).collect();
        names.sort();
        names.dedup();

        names
            .into_iter()
            .filter_map(|name| {
                match (before_entries.get(name), after_entries.get(name)) {
                    (Some(b), Some(a)) => Some(StateChange::new(name.clone(), Some(b.clone()), Some(a.clone()))),
                    (None, Some(a)) => Some(StateChange::created(name.clone(), a.clone())),
                    (Some(b), None) if whole_resource_deleted || self.delete_orphan_entries => {
                        Some(StateChange::deleted(name.clone(), b.clone()))
                    }
                    _ => None,
                }
            })
            .collect()
    }
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(Map::is_empty)
}

/// Returns true if `entries` holds a flattened entry below `top`.
fn has_nested_entries(entries: &BTreeMap<String, Value>, top: &str) -> bool {
    entries
        .keys()
        .any(|name| name.strip_prefix(top).is_some_and(|rest| rest.starts_with('.')))
}

/// Compares items through a single extracted value.
///
/// Suited to simple items (a quota, an ACL binding, a schema string) where a
/// whole-value comparison is the right granularity.
pub struct ValueChangeFactory<T> {
    kind: String,
    field: String,
    value_of: Box<dyn Fn(&T) -> Value + Send + Sync>,
}

impl<T> ValueChangeFactory<T> {
    /// Creates a factory emitting one state change named `field`.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        field: impl Into<String>,
        value_of: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: kind.into(),
            field: field.into(),
            value_of: Box::new(value_of),
        }
    }
}

impl<T> std::fmt::Debug for ValueChangeFactory<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueChangeFactory")
            .field("kind", &self.kind)
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

impl<K: Display, T> ChangeFactory<K, T> for ValueChangeFactory<T> {
    fn metadata(&self, key: &K, _item: &T) -> ChangeMetadata {
        ChangeMetadata::new(self.kind.clone(), key.to_string())
    }

    fn state_changes(&self, before: Option<&T>, after: Option<&T>) -> Vec<StateChange> {
        vec![StateChange::new(
            self.field.clone(),
            before.map(|b| (self.value_of)(b)),
            after.map(|a| (self.value_of)(a)),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Operation;
    use serde_json::json;

    fn topic(partitions: Value) -> Resource {
        Resource::new("Topic", "orders")
            .with_spec("partitions", partitions)
            .with_spec("configs", json!({"retention.ms": "1000", "cleanup.policy": "delete"}))
    }

    #[test]
    fn test_entries_expand_one_level() {
        let entries = SpecChangeFactory::entries(&topic(json!(3)).spec);
        assert_eq!(
            entries.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["configs.cleanup.policy", "configs.retention.ms", "partitions"]
        );
    }

    #[test]
    fn test_update_detects_changed_entry() {
        let factory = SpecChangeFactory::new();
        let key = String::from("orders");
        let change = factory.create_for_update(&key, &topic(json!(3)), &topic(json!(6)));
        assert_eq!(change.operation(), Operation::Update);
        let partitions = change.state_change("partitions").unwrap();
        assert_eq!(partitions.operation(), Operation::Update);
        assert_eq!(partitions.before(), Some(&json!(3)));
        assert_eq!(partitions.after(), Some(&json!(6)));
    }

    #[test]
    fn test_update_tolerates_stringified_values() {
        let factory = SpecChangeFactory::new();
        let key = String::from("orders");
        let change = factory.create_for_update(&key, &topic(json!(3)), &topic(json!("3")));
        assert_eq!(change.operation(), Operation::None);
    }

    #[test]
    fn test_observed_only_entries() {
        let key = String::from("orders");
        let observed = topic(json!(3)).with_spec("replicas", json!(3));
        let desired = topic(json!(3));

        let kept = SpecChangeFactory::new().create_for_update(&key, &observed, &desired);
        assert_eq!(kept.operation(), Operation::None);
        assert!(kept.state_change("replicas").is_none());

        let pruned = SpecChangeFactory::new()
            .with_delete_orphan_entries(true)
            .create_for_update(&key, &observed, &desired);
        assert_eq!(pruned.operation(), Operation::Update);
        assert_eq!(
            pruned.state_change("replicas").map(StateChange::operation),
            Some(Operation::Delete)
        );
    }

    #[test]
    fn test_empty_desired_object_keeps_observed_entries() {
        let key = String::from("orders");
        let observed = Resource::new("Topic", "orders")
            .with_spec("configs", json!({"cleanup.policy": "compact"}));
        let desired = Resource::new("Topic", "orders").with_spec("configs", json!({}));

        let kept = SpecChangeFactory::new().create_for_update(&key, &observed, &desired);
        assert_eq!(kept.operation(), Operation::None);
        assert!(kept.state_changes().is_empty());

        let pruned = SpecChangeFactory::new()
            .with_delete_orphan_entries(true)
            .create_for_update(&key, &observed, &desired);
        assert_eq!(pruned.operation(), Operation::Update);
        assert_eq!(
            pruned.state_change("configs.cleanup.policy").map(StateChange::operation),
            Some(Operation::Delete)
        );
    }

    #[test]
    fn test_dotted_top_level_key_is_rejected() {
        let nested = Resource::new("Topic", "orders").with_spec("configs", json!({"retention.ms": "1"}));
        assert!(SpecChangeFactory::check_spec_keys(&nested).is_ok());

        let dotted = Resource::new("Topic", "orders").with_spec("retention.ms", json!("1000"));
        let err = SpecChangeFactory::check_spec_keys(&dotted).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { field: Some(ref f), .. } if f == "spec.retention.ms"));
    }

    #[test]
    fn test_create_and_delete() {
        let factory = SpecChangeFactory::new();
        let key = String::from("orders");
        let created = factory.create_for_create(&key, &topic(json!(1)));
        assert_eq!(created.operation(), Operation::Create);
        assert!(created.state_changes().iter().all(|c| c.operation() == Operation::Create));

        let deleted = factory.create_for_delete(&key, &topic(json!(1)));
        assert_eq!(deleted.operation(), Operation::Delete);
        assert_eq!(deleted.state_changes().len(), 3);
        assert!(deleted.state_changes().iter().all(|c| c.operation() == Operation::Delete));

        let converged = factory.create_for_none(&key, &topic(json!(1)));
        assert_eq!(converged.operation(), Operation::None);
    }

    #[test]
    fn test_value_factory() {
        let factory = ValueChangeFactory::new("Quota", "bytes", |q: &(String, u64)| json!(q.1));
        let key = String::from("client-a");
        let before = (key.clone(), 1024_u64);
        let after = (key.clone(), 2048_u64);

        let change = factory.create_for_update(&key, &before, &after);
        assert_eq!(change.kind(), "Quota");
        assert_eq!(change.name(), "client-a");
        assert_eq!(change.operation(), Operation::Update);
        assert_eq!(change.state_changes().len(), 1);

        let same = factory.create_for_update(&key, &before, &before);
        assert_eq!(same.operation(), Operation::None);
    }
}
