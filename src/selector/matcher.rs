//! Matching strategies selected by the `name:` prefix of an expression.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::model::Resource;

use super::accessor::PropertyAccessorChain;

/// Name of the strategy used when an expression has no prefix.
pub const DEFAULT_SELECTOR: &str = "field";

/// Resolves the key of an expression against a resource.
pub trait SelectorStrategy: Send + Sync {
    /// Returns the value the operator predicate is applied to.
    fn resolve(&self, resource: &Resource, key: &str) -> Option<Value>;
}

/// Constructor registered under a strategy name.
pub type StrategyConstructor = fn(&Arc<PropertyAccessorChain>) -> Arc<dyn SelectorStrategy>;

/// Resolves dotted field paths through the property accessor chain.
#[derive(Debug, Clone)]
pub struct FieldStrategy {
    accessors: Arc<PropertyAccessorChain>,
}

impl FieldStrategy {
    /// Creates a field strategy over the given accessors.
    #[must_use]
    pub const fn new(accessors: Arc<PropertyAccessorChain>) -> Self {
        Self { accessors }
    }
}

impl SelectorStrategy for FieldStrategy {
    fn resolve(&self, resource: &Resource, key: &str) -> Option<Value> {
        self.accessors.resolve(resource, key)
    }
}

/// Reads a label by its full key.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelStrategy;

impl SelectorStrategy for LabelStrategy {
    fn resolve(&self, resource: &Resource, key: &str) -> Option<Value> {
        resource
            .metadata
            .labels
            .get(key)
            .map(|v| Value::String(v.clone()))
    }
}

/// Reads an annotation by its full key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotationStrategy;

impl SelectorStrategy for AnnotationStrategy {
    fn resolve(&self, resource: &Resource, key: &str) -> Option<Value> {
        resource
            .metadata
            .annotations
            .get(key)
            .map(|v| Value::String(v.clone()))
    }
}

/// Matches the resource kind.
///
/// The key names a kind, compared ignoring case: `kind:Topic Exists` keeps
/// topics, `kind:Topic DoesNotExist` drops them. A matching key resolves to
/// the kind itself, so `kind:topic In (Topic)` holds as well.
#[derive(Debug, Clone, Copy, Default)]
pub struct KindStrategy;

impl SelectorStrategy for KindStrategy {
    fn resolve(&self, resource: &Resource, key: &str) -> Option<Value> {
        resource
            .kind
            .eq_ignore_ascii_case(key)
            .then(|| Value::String(resource.kind.clone()))
    }
}

/// Registry of matching strategies, keyed by name.
#[derive(Debug, Clone)]
pub struct SelectorRegistry {
    constructors: BTreeMap<String, StrategyConstructor>,
}

impl SelectorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Creates a registry holding the `field`, `label`, `annotation` and
    /// `kind` strategies.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_SELECTOR, |accessors| {
            Arc::new(FieldStrategy::new(Arc::clone(accessors)))
        });
        registry.register("label", |_| Arc::new(LabelStrategy));
        registry.register("annotation", |_| Arc::new(AnnotationStrategy));
        registry.register("kind", |_| Arc::new(KindStrategy));
        registry
    }

    /// Registers a strategy constructor, replacing any with the same name.
    pub fn register(&mut self, name: impl Into<String>, constructor: StrategyConstructor) {
        self.constructors.insert(name.into().to_ascii_lowercase(), constructor);
    }

    /// Builds the strategy registered under `name`, ignoring case.
    #[must_use]
    pub fn build(
        &self,
        name: &str,
        accessors: &Arc<PropertyAccessorChain>,
    ) -> Option<Arc<dyn SelectorStrategy>> {
        self.constructors
            .get(&name.to_ascii_lowercase())
            .map(|constructor| constructor(accessors))
    }
}

impl Default for SelectorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
