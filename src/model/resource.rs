//! Resource descriptors and desired-state tagging.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Annotation marking a desired resource for deletion.
pub const ANNOTATION_DELETE: &str = "halyard.io/delete";

/// Annotation excluding a resource from reconciliation entirely.
pub const ANNOTATION_IGNORE: &str = "halyard.io/ignore";

/// A declarative resource, as written in desired-state files or reported by
/// a managed system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// API group and version of the resource.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Resource kind (e.g. `Topic`, `Schema`, `Connector`).
    pub kind: String,
    /// Identity and free-form metadata.
    pub metadata: ObjectMeta,
    /// Kind-specific desired or observed properties.
    #[serde(default)]
    pub spec: Map<String, Value>,
}

/// Resource metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Name, unique within the resource kind.
    pub name: String,
    /// Identifying labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Non-identifying annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Default API version for resources that do not declare one.
fn default_api_version() -> String {
    String::from("halyard.io/v1")
}

impl Resource {
    /// Creates an empty resource of the given kind.
    #[must_use]
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: kind.into(),
            metadata: ObjectMeta {
                name: name.into(),
                ..ObjectMeta::default()
            },
            spec: Map::new(),
        }
    }

    /// Adds a spec entry.
    #[must_use]
    pub fn with_spec(mut self, key: impl Into<String>, value: Value) -> Self {
        self.spec.insert(key.into(), value);
        self
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    /// Adds an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    /// Resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns true if the annotation is set to `true` (case-insensitive).
    #[must_use]
    pub fn has_flag(&self, annotation: &str) -> bool {
        self.metadata
            .annotations
            .get(annotation)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    /// Returns true if the resource opts out of reconciliation.
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        self.has_flag(ANNOTATION_IGNORE)
    }
}

/// A desired item tagged with whether it should exist.
#[derive(Debug, Clone, PartialEq)]
pub enum DesiredState<T> {
    /// The item should exist with this content.
    Present(T),
    /// The item should not exist.
    MarkedForDeletion(T),
}

impl<T> DesiredState<T> {
    /// The wrapped item.
    #[must_use]
    pub const fn item(&self) -> &T {
        match self {
            Self::Present(item) | Self::MarkedForDeletion(item) => item,
        }
    }

    /// Returns true for [`DesiredState::MarkedForDeletion`].
    #[must_use]
    pub const fn is_marked_for_deletion(&self) -> bool {
        matches!(self, Self::MarkedForDeletion(_))
    }
}

impl From<Resource> for DesiredState<Resource> {
    fn from(resource: Resource) -> Self {
        if resource.has_flag(ANNOTATION_DELETE) {
            Self::MarkedForDeletion(resource)
        } else {
            Self::Present(resource)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_resource_yaml() {
        let yaml = r#"
kind: Topic
metadata:
  name: orders
  labels:
    team: payments
spec:
  partitions: 6
  configs:
    retention.ms: "86400000"
"#;
        let resource: Resource = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(resource.api_version, "halyard.io/v1");
        assert_eq!(resource.kind, "Topic");
        assert_eq!(resource.name(), "orders");
        assert_eq!(resource.metadata.labels.get("team").map(String::as_str), Some("payments"));
        assert_eq!(resource.spec.get("partitions"), Some(&json!(6)));
    }

    #[test]
    fn test_desired_state_from_annotation() {
        let present: DesiredState<Resource> = Resource::new("Topic", "a").into();
        assert!(!present.is_marked_for_deletion());

        let marked: DesiredState<Resource> = Resource::new("Topic", "b")
            .with_annotation(ANNOTATION_DELETE, "TRUE")
            .into();
        assert!(marked.is_marked_for_deletion());
        assert_eq!(marked.item().name(), "b");

        let not_marked: DesiredState<Resource> = Resource::new("Topic", "c")
            .with_annotation(ANNOTATION_DELETE, "false")
            .into();
        assert!(!not_marked.is_marked_for_deletion());
    }

    #[test]
    fn test_ignore_flag() {
        assert!(Resource::new("Topic", "a").with_annotation(ANNOTATION_IGNORE, "true").is_ignored());
        assert!(!Resource::new("Topic", "a").is_ignored());
    }
}
