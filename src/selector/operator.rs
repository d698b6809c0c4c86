//! Selector operators.
//!
//! An operator turns the literal values of an expression into a predicate
//! over the resolved property value (`None` when the property is absent).

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::error::SelectorError;
use crate::model::values_equal;

/// Predicate over a resolved property value.
pub type Predicate = Box<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

/// A named predicate strategy.
pub trait ExpressionOperator: Send + Sync {
    /// Operator name, matched case-insensitively.
    fn name(&self) -> &'static str;

    /// Builds the predicate for the given literal values.
    ///
    /// # Errors
    ///
    /// Returns an error if the values are not acceptable for this operator.
    fn predicate(&self, values: &[String]) -> Result<Predicate, SelectorError>;
}

/// Registry of operators, keyed by lowercase name.
#[derive(Clone)]
pub struct OperatorRegistry {
    operators: BTreeMap<String, Arc<dyn ExpressionOperator>>,
}

impl OperatorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            operators: BTreeMap::new(),
        }
    }

    /// Creates a registry holding the built-in operators.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(In);
        registry.register(NotIn);
        registry.register(Exists);
        registry.register(DoesNotExist);
        registry.register(Matches);
        registry.register(DoesNotMatch);
        registry
    }

    /// Registers an operator, replacing any operator with the same name.
    pub fn register(&mut self, operator: impl ExpressionOperator + 'static) {
        self.operators
            .insert(operator.name().to_ascii_lowercase(), Arc::new(operator));
    }

    /// Looks up an operator by name, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ExpressionOperator>> {
        self.operators.get(&name.to_ascii_lowercase()).cloned()
    }

    /// Registered operator names.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.operators.values().map(|o| o.name()).collect()
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Returns true if `actual` (or, for arrays, one of its elements) equals a literal.
fn matches_any_literal(actual: &Value, literals: &[String]) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| matches_any_literal(item, literals)),
        other => literals
            .iter()
            .any(|literal| values_equal(other, &Value::String(literal.clone()))),
    }
}

/// String form of a value used for pattern matching.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn require_values(operator: &str, values: &[String]) -> Result<(), SelectorError> {
    if values.is_empty() {
        return Err(SelectorError::parse(
            operator,
            format!("operator {operator} requires at least one value"),
        ));
    }
    Ok(())
}

fn compile_patterns(values: &[String]) -> Result<Vec<Regex>, SelectorError> {
    values
        .iter()
        .map(|pattern| {
            Regex::new(&format!("^(?:{pattern})$")).map_err(|e| SelectorError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

/// Matches when the value equals one of the literals.
#[derive(Debug, Clone, Copy, Default)]
pub struct In;

impl ExpressionOperator for In {
    fn name(&self) -> &'static str {
        "In"
    }

    fn predicate(&self, values: &[String]) -> Result<Predicate, SelectorError> {
        require_values(self.name(), values)?;
        let literals = values.to_vec();
        Ok(Box::new(move |actual| {
            actual.is_some_and(|v| matches_any_literal(v, &literals))
        }))
    }
}

/// Matches when the value is absent or equals none of the literals.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotIn;

impl ExpressionOperator for NotIn {
    fn name(&self) -> &'static str {
        "NotIn"
    }

    fn predicate(&self, values: &[String]) -> Result<Predicate, SelectorError> {
        require_values(self.name(), values)?;
        let literals = values.to_vec();
        Ok(Box::new(move |actual| {
            !actual.is_some_and(|v| matches_any_literal(v, &literals))
        }))
    }
}

/// Matches when the property is present and not null.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exists;

impl ExpressionOperator for Exists {
    fn name(&self) -> &'static str {
        "Exists"
    }

    fn predicate(&self, _values: &[String]) -> Result<Predicate, SelectorError> {
        Ok(Box::new(|actual| actual.is_some_and(|v| !v.is_null())))
    }
}

/// Matches when the property is absent or null.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoesNotExist;

impl ExpressionOperator for DoesNotExist {
    fn name(&self) -> &'static str {
        "DoesNotExist"
    }

    fn predicate(&self, _values: &[String]) -> Result<Predicate, SelectorError> {
        Ok(Box::new(|actual| actual.is_none_or(Value::is_null)))
    }
}

/// Matches when the value fully matches one of the patterns.
#[derive(Debug, Clone, Copy, Default)]
pub struct Matches;

impl ExpressionOperator for Matches {
    fn name(&self) -> &'static str {
        "Matches"
    }

    fn predicate(&self, values: &[String]) -> Result<Predicate, SelectorError> {
        require_values(self.name(), values)?;
        let patterns = compile_patterns(values)?;
        Ok(Box::new(move |actual| {
            actual.is_some_and(|v| {
                let text = as_text(v);
                patterns.iter().any(|p| p.is_match(&text))
            })
        }))
    }
}

/// Matches when the value is absent or matches none of the patterns.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoesNotMatch;

impl ExpressionOperator for DoesNotMatch {
    fn name(&self) -> &'static str {
        "DoesNotMatch"
    }

    fn predicate(&self, values: &[String]) -> Result<Predicate, SelectorError> {
        let matches = Matches.predicate(values)?;
        Ok(Box::new(move |actual| !matches(actual)))
    }
}
