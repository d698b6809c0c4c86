//! Property accessors used to resolve selector keys.
//!
//! Accessors are tried by specificity: an accessor registered for the
//! concrete type of the target wins, otherwise the generic accessors are
//! tried in registration order. Missing properties resolve to `None`.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::model::Resource;

/// Reads named properties from a value.
pub trait PropertyAccessor: Send + Sync {
    /// Returns true if this accessor can read properties of `target`.
    fn can_read(&self, target: &dyn Any) -> bool;

    /// Reads `property` from `target`.
    fn read(&self, target: &dyn Any, property: &str) -> Option<Value>;
}

/// Ordered chain of property accessors.
#[derive(Clone)]
pub struct PropertyAccessorChain {
    typed: HashMap<TypeId, Arc<dyn PropertyAccessor>>,
    generic: Vec<Arc<dyn PropertyAccessor>>,
}

impl PropertyAccessorChain {
    /// Creates a chain holding only the generic JSON accessors.
    #[must_use]
    pub fn new() -> Self {
        Self {
            typed: HashMap::new(),
            generic: vec![Arc::new(JsonObjectAccessor), Arc::new(JsonArrayAccessor)],
        }
    }

    /// Creates a chain that can read resources and string maps.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut chain = Self::new();
        chain.register::<Resource>(ResourceAccessor);
        chain.register::<BTreeMap<String, String>>(StringMapAccessor);
        chain
    }

    /// Registers an accessor for one concrete type, replacing any previous one.
    pub fn register<T: Any>(&mut self, accessor: impl PropertyAccessor + 'static) {
        self.typed.insert(TypeId::of::<T>(), Arc::new(accessor));
    }

    /// Registers a serde-based field accessor for `T`.
    pub fn register_serializable<T: Serialize + Any>(&mut self) {
        self.register::<T>(SerializedFieldAccessor::<T>(PhantomData));
    }

    /// Appends a generic accessor, tried after every typed accessor.
    pub fn push_generic(&mut self, accessor: impl PropertyAccessor + 'static) {
        self.generic.push(Arc::new(accessor));
    }

    /// Reads a single (non-dotted) property.
    #[must_use]
    pub fn read(&self, target: &dyn Any, property: &str) -> Option<Value> {
        if let Some(accessor) = self.typed.get(&target.type_id()) {
            return accessor.read(target, property);
        }
        self.generic
            .iter()
            .find(|a| a.can_read(target))
            .and_then(|a| a.read(target, property))
    }

    /// Resolves a possibly dotted path.
    ///
    /// `a.b.c` reads `a`, then resolves `b.c` against the result. When the
    /// split path yields nothing, the whole remaining path is tried as one
    /// property so keys that contain dots (`app.kubernetes.io/name`) resolve.
    #[must_use]
    pub fn resolve(&self, target: &dyn Any, path: &str) -> Option<Value> {
        if path.is_empty() {
            return None;
        }
        match path.split_once('.') {
            None => self.read(target, path),
            Some((head, rest)) => self
                .read(target, head)
                .and_then(|value| self.resolve(&value, rest))
                .or_else(|| self.read(target, path)),
        }
    }
}

impl Default for PropertyAccessorChain {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for PropertyAccessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyAccessorChain")
            .field("typed", &self.typed.len())
            .field("generic", &self.generic.len())
            .finish()
    }
}

/// Reads entries of a JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonObjectAccessor;

impl PropertyAccessor for JsonObjectAccessor {
    fn can_read(&self, target: &dyn Any) -> bool {
        matches!(target.downcast_ref::<Value>(), Some(Value::Object(_)))
    }

    fn read(&self, target: &dyn Any, property: &str) -> Option<Value> {
        match target.downcast_ref::<Value>() {
            Some(Value::Object(map)) => map.get(property).cloned(),
            _ => None,
        }
    }
}

/// Reads elements of a JSON array by index.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArrayAccessor;

impl PropertyAccessor for JsonArrayAccessor {
    fn can_read(&self, target: &dyn Any) -> bool {
        matches!(target.downcast_ref::<Value>(), Some(Value::Array(_)))
    }

    fn read(&self, target: &dyn Any, property: &str) -> Option<Value> {
        let index: usize = property.parse().ok()?;
        match target.downcast_ref::<Value>() {
            Some(Value::Array(items)) => items.get(index).cloned(),
            _ => None,
        }
    }
}

/// Reads entries of a string map (labels, annotations).
#[derive(Debug, Clone, Copy, Default)]
pub struct StringMapAccessor;

impl PropertyAccessor for StringMapAccessor {
    fn can_read(&self, target: &dyn Any) -> bool {
        target.is::<BTreeMap<String, String>>()
    }

    fn read(&self, target: &dyn Any, property: &str) -> Option<Value> {
        target
            .downcast_ref::<BTreeMap<String, String>>()
            .and_then(|map| map.get(property))
            .map(|v| Value::String(v.clone()))
    }
}

/// Reads well-known resource properties.
///
/// Besides `apiVersion`, `kind`, `metadata` and `spec`, the shorthands
/// `name`, `labels` and `annotations` read from the metadata. Any other
/// property falls back to the top-level spec entry of the same name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceAccessor;

impl PropertyAccessor for ResourceAccessor {
    fn can_read(&self, target: &dyn Any) -> bool {
        target.is::<Resource>()
    }

    fn read(&self, target: &dyn Any, property: &str) -> Option<Value> {
        let resource = target.downcast_ref::<Resource>()?;
        match property {
            "apiVersion" => Some(Value::String(resource.api_version.clone())),
            "kind" => Some(Value::String(resource.kind.clone())),
            "name" => Some(Value::String(resource.metadata.name.clone())),
            "metadata" => serde_json::to_value(&resource.metadata).ok(),
            "labels" => serde_json::to_value(&resource.metadata.labels).ok(),
            "annotations" => serde_json::to_value(&resource.metadata.annotations).ok(),
            "spec" => Some(Value::Object(resource.spec.clone())),
            other => resource.spec.get(other).cloned(),
        }
    }
}

/// Reads the serialized fields of any `Serialize` type.
pub struct SerializedFieldAccessor<T>(PhantomData<fn() -> T>);

impl<T: Serialize + Any> PropertyAccessor for SerializedFieldAccessor<T> {
    fn can_read(&self, target: &dyn Any) -> bool {
        target.is::<T>()
    }

    fn read(&self, target: &dyn Any, property: &str) -> Option<Value> {
        let value = serde_json::to_value(target.downcast_ref::<T>()?).ok()?;
        match value {
            Value::Object(mut map) => map.remove(property),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dotted_path_resolves_nested_value() {
        let chain = PropertyAccessorChain::new();
        let target = json!({"a": {"b": 5}});
        assert_eq!(chain.resolve(&target, "a.b"), Some(json!(5)));
    }

    #[test]
    fn test_missing_property_is_none() {
        let chain = PropertyAccessorChain::new();
        let target = json!({"a": {}});
        assert_eq!(chain.resolve(&target, "a.b"), None);
        assert_eq!(chain.resolve(&target, "x"), None);
        assert_eq!(chain.resolve(&json!(3), "a"), None);
    }

    #[test]
    fn test_array_index() {
        let chain = PropertyAccessorChain::new();
        let target = json!({"brokers": [{"id": 1}, {"id": 2}]});
        assert_eq!(chain.resolve(&target, "brokers.1.id"), Some(json!(2)));
        assert_eq!(chain.resolve(&target, "brokers.7.id"), None);
    }

    #[test]
    fn test_resource_properties() {
        let chain = PropertyAccessorChain::with_defaults();
        let resource = Resource::new("Topic", "orders")
            .with_label("app.kubernetes.io/name", "shop")
            .with_spec("partitions", json!(6))
            .with_spec("configs", json!({"retention.ms": "1000"}));

        assert_eq!(chain.resolve(&resource, "kind"), Some(json!("Topic")));
        assert_eq!(chain.resolve(&resource, "metadata.name"), Some(json!("orders")));
        assert_eq!(chain.resolve(&resource, "spec.partitions"), Some(json!(6)));
        assert_eq!(chain.resolve(&resource, "partitions"), Some(json!(6)));
        assert_eq!(
            chain.resolve(&resource, "labels.app.kubernetes.io/name"),
            Some(json!("shop"))
        );
        assert_eq!(
            chain.resolve(&resource, "spec.configs.retention.ms"),
            Some(json!("1000"))
        );
        assert_eq!(chain.resolve(&resource, "spec.replicas"), None);
    }

    #[test]
    fn test_typed_accessor_takes_precedence() {
        struct Constant;
        impl PropertyAccessor for Constant {
            fn can_read(&self, _target: &dyn Any) -> bool {
                true
            }
            fn read(&self, _target: &dyn Any, _property: &str) -> Option<Value> {
                Some(json!("typed"))
            }
        }

        let mut chain = PropertyAccessorChain::new();
        chain.register::<Value>(Constant);
        assert_eq!(chain.resolve(&json!({"a": 1}), "a"), Some(json!("typed")));
    }

    #[test]
    fn test_generic_accessor_reads_other_types() {
        struct Environment;
        impl PropertyAccessor for Environment {
            fn can_read(&self, target: &dyn Any) -> bool {
                target.is::<Vec<(String, String)>>()
            }
            fn read(&self, target: &dyn Any, property: &str) -> Option<Value> {
                target
                    .downcast_ref::<Vec<(String, String)>>()?
                    .iter()
                    .find(|(key, _)| key == property)
                    .map(|(_, value)| json!(value))
            }
        }

        let env = vec![(String::from("REGION"), String::from("eu-west-1"))];
        let mut chain = PropertyAccessorChain::new();
        assert_eq!(chain.resolve(&env, "REGION"), None);

        chain.push_generic(Environment);
        assert_eq!(chain.resolve(&env, "REGION"), Some(json!("eu-west-1")));
        assert_eq!(chain.resolve(&env, "ZONE"), None);
        assert_eq!(chain.resolve(&json!({"a": 1}), "a"), Some(json!(1)));
    }

    #[test]
    fn test_serializable_fallback() {
        #[derive(Serialize)]
        struct Broker {
            id: u32,
            rack: String,
        }

        let mut chain = PropertyAccessorChain::new();
        chain.register_serializable::<Broker>();
        let broker = Broker {
            id: 3,
            rack: String::from("eu-west-1a"),
        };
        assert_eq!(chain.resolve(&broker, "rack"), Some(json!("eu-west-1a")));
        assert_eq!(chain.resolve(&broker, "id"), Some(json!(3)));
        assert_eq!(chain.resolve(&broker, "zone"), None);
    }
}
