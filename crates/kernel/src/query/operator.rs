//! Operator registry.
//!
//! Maps the short operator token used in filter keys (`price:gte`) to the
//! comparison symbol rendered into the statement, a value transform, and a
//! pattern restricting which field names the operator may be applied to.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::types::FilterValue;

/// Token used when a filter key carries no explicit operator.
pub const DEFAULT_OPERATOR: &str = "eq";

/// Built-in comparison operators: token → symbol.
pub const DEFAULT_OPERATORS: &[(&str, &str)] = &[
    ("eq", "="),
    ("ne", "<>"),
    ("lt", "<"),
    ("gt", ">"),
    ("lte", "<="),
    ("gte", ">="),
];

/// # Panics
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static ANY_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(".*").expect("valid regex literal"));

/// Turns raw parameter values into the value bound to the predicate.
pub trait ValueTransform: Send + Sync {
    fn transform(&self, values: Vec<String>) -> FilterValue;
}

impl<F> ValueTransform for F
where
    F: Fn(Vec<String>) -> FilterValue + Send + Sync,
{
    fn transform(&self, values: Vec<String>) -> FilterValue {
        self(values)
    }
}

/// Passes values through unchanged.
pub struct Identity;

impl ValueTransform for Identity {
    fn transform(&self, values: Vec<String>) -> FilterValue {
        FilterValue::from_strings(values)
    }
}

/// Escapes LIKE wildcards in each value and appends `%`.
pub struct PrefixSearch;

impl ValueTransform for PrefixSearch {
    fn transform(&self, values: Vec<String>) -> FilterValue {
        FilterValue::from_strings(
            values
                .iter()
                .map(|v| format!("{}%", escape_like_wildcards(v)))
                .collect(),
        )
    }
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
pub fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// A registered operator.
#[derive(Clone)]
pub struct Operator {
    symbol: String,
    transform: Arc<dyn ValueTransform>,
    field_matcher: Regex,
}

impl Operator {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn field_matches(&self, field_name: &str) -> bool {
        self.field_matcher.is_match(field_name)
    }

    pub fn transform_value(&self, values: Vec<String>) -> FilterValue {
        self.transform.transform(values)
    }
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("symbol", &self.symbol)
            .field("field_matcher", &self.field_matcher.as_str())
            .finish()
    }
}

/// Token → operator lookup owned by one builder.
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    operators: HashMap<String, Operator>,
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorRegistry {
    /// Create a registry with the comparison operators pre-registered.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for (token, symbol) in DEFAULT_OPERATORS {
            registry.register(token, symbol, Identity, ANY_FIELD.clone());
        }
        registry
    }

    /// Create a registry with no operators.
    pub fn empty() -> Self {
        Self {
            operators: HashMap::new(),
        }
    }

    /// Register an operator, replacing any previous one with the same token.
    pub fn register(
        &mut self,
        token: &str,
        symbol: &str,
        transform: impl ValueTransform + 'static,
        field_matcher: Regex,
    ) {
        self.operators.insert(
            token.to_string(),
            Operator {
                symbol: symbol.to_string(),
                transform: Arc::new(transform),
                field_matcher,
            },
        );
    }

    pub fn get(&self, token: &str) -> Option<&Operator> {
        self.operators.get(token)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}
