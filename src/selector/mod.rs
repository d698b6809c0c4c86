//! Resource selection by textual expressions.
//!
//! This module parses selector expressions, resolves their keys against
//! resources through the property accessor chain, and filters resource
//! collections with the resulting predicates.
//!
//! ```text
//! kind In (Topic)
//! label:team In (payments, billing)
//! kind:Topic Exists
//! spec.partitions NotIn (1), metadata.name Matches orders-.*
//! ```

mod accessor;
mod expression;
mod matcher;
mod operator;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SelectorError;
use crate::model::Resource;

pub use accessor::{
    JsonArrayAccessor, JsonObjectAccessor, PropertyAccessor, PropertyAccessorChain,
    ResourceAccessor, SerializedFieldAccessor, StringMapAccessor,
};
pub use expression::{parse_expression_string, SelectorExpression};
pub use matcher::{
    AnnotationStrategy, FieldStrategy, KindStrategy, LabelStrategy, SelectorRegistry,
    SelectorStrategy, StrategyConstructor, DEFAULT_SELECTOR,
};
pub use operator::{
    DoesNotExist, DoesNotMatch, Exists, ExpressionOperator, In, Matches, NotIn,
    OperatorRegistry, Predicate,
};

/// How the conditions of a selector set combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchingStrategy {
    /// Every condition must match.
    #[default]
    All,
    /// At least one condition must match.
    Any,
    /// No condition may match.
    None,
}

/// One compiled condition.
pub struct ExpressionSelector {
    expression: SelectorExpression,
    strategy: Arc<dyn SelectorStrategy>,
    predicate: Predicate,
}

impl ExpressionSelector {
    /// The expression this selector was compiled from.
    #[must_use]
    pub const fn expression(&self) -> &SelectorExpression {
        &self.expression
    }

    /// Returns true if the resource satisfies the condition.
    #[must_use]
    pub fn matches(&self, resource: &Resource) -> bool {
        let value = self.strategy.resolve(resource, &self.expression.key);
        (self.predicate)(value.as_ref())
    }
}

impl std::fmt::Debug for ExpressionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ExpressionSelector")
            .field(&self.expression.raw)
            .finish()
    }
}

/// A compiled set of conditions.
#[derive(Debug, Default)]
pub struct Selectors {
    selectors: Vec<ExpressionSelector>,
    strategy: MatchingStrategy,
}

impl Selectors {
    /// A selector set that matches every resource.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Compiles expressions with the default registries.
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending expression if any fails to parse.
    pub fn parse<S: AsRef<str>>(expressions: &[S]) -> Result<Self, SelectorError> {
        SelectorCompiler::new().compile(expressions)
    }

    /// Sets how conditions combine.
    #[must_use]
    pub fn with_strategy(mut self, strategy: MatchingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Returns true if the set holds no condition.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Compiled conditions.
    #[must_use]
    pub fn selectors(&self) -> &[ExpressionSelector] {
        &self.selectors
    }

    /// Returns true if the resource is selected.
    ///
    /// An empty set selects everything, whatever the strategy.
    #[must_use]
    pub fn matches(&self, resource: &Resource) -> bool {
        if self.selectors.is_empty() {
            return true;
        }
        match self.strategy {
            MatchingStrategy::All => self.selectors.iter().all(|s| s.matches(resource)),
            MatchingStrategy::Any => self.selectors.iter().any(|s| s.matches(resource)),
            MatchingStrategy::None => !self.selectors.iter().any(|s| s.matches(resource)),
        }
    }

    /// Keeps the selected resources.
    #[must_use]
    pub fn filter(&self, resources: Vec<Resource>) -> Vec<Resource> {
        let before = resources.len();
        let selected: Vec<Resource> = resources.into_iter().filter(|r| self.matches(r)).collect();
        if before != selected.len() {
            debug!("Selectors kept {} of {} resources", selected.len(), before);
        }
        selected
    }
}

/// Compiles expression strings into [`Selectors`].
#[derive(Debug, Clone)]
pub struct SelectorCompiler {
    selectors: SelectorRegistry,
    operators: OperatorRegistry,
    accessors: Arc<PropertyAccessorChain>,
}

impl SelectorCompiler {
    /// Creates a compiler with the default strategies, operators and accessors.
    #[must_use]
    pub fn new() -> Self {
        Self {
            selectors: SelectorRegistry::with_defaults(),
            operators: OperatorRegistry::with_defaults(),
            accessors: Arc::new(PropertyAccessorChain::with_defaults()),
        }
    }

    /// Replaces the strategy registry.
    #[must_use]
    pub fn with_selectors(mut self, selectors: SelectorRegistry) -> Self {
        self.selectors = selectors;
        self
    }

    /// Replaces the operator registry.
    #[must_use]
    pub fn with_operators(mut self, operators: OperatorRegistry) -> Self {
        self.operators = operators;
        self
    }

    /// Replaces the property accessor chain.
    #[must_use]
    pub fn with_accessors(mut self, accessors: PropertyAccessorChain) -> Self {
        self.accessors = Arc::new(accessors);
        self
    }

    /// Compiles every expression string; conditions are combined with
    /// [`MatchingStrategy::All`].
    ///
    /// # Errors
    ///
    /// Returns the first parse, selector, operator or pattern error.
    pub fn compile<S: AsRef<str>>(&self, expressions: &[S]) -> Result<Selectors, SelectorError> {
        let mut selectors = Vec::new();
        for expr in expressions {
            for expression in parse_expression_string(expr.as_ref())? {
                selectors.push(self.compile_expression(expression)?);
            }
        }
        Ok(Selectors {
            selectors,
            strategy: MatchingStrategy::All,
        })
    }

    /// Compiles one parsed condition.
    fn compile_expression(
        &self,
        expression: SelectorExpression,
    ) -> Result<ExpressionSelector, SelectorError> {
        let name = expression.selector.as_deref().unwrap_or(DEFAULT_SELECTOR);
        let strategy = self.selectors.build(name, &self.accessors).ok_or_else(|| {
            SelectorError::UnknownSelector {
                name: name.to_string(),
                expression: expression.raw.clone(),
            }
        })?;

        let operator = self.operators.get(&expression.operator).ok_or_else(|| {
            SelectorError::UnknownOperator {
                operator: expression.operator.clone(),
                expression: expression.raw.clone(),
            }
        })?;
        let predicate = operator.predicate(&expression.values)?;

        Ok(ExpressionSelector {
            expression,
            strategy,
            predicate,
        })
    }
}

impl Default for SelectorCompiler {
    fn default() -> Self {
        Self::new()
    }
}
