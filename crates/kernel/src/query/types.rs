//! Query description types.
//!
//! The parser produces one of three progressively richer tiers:
//! - PlainQuery: entity reference and relation preloads
//! - FilteredQuery: a PlainQuery plus filter predicates
//! - PaginatedQuery: a FilteredQuery plus a pagination window
//!
//! A [`QueryDescription`] wraps the tier together with the outcome slot the
//! executor fills in.

use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::schema::{EntityRef, Model};
use crate::error::{QueryError, QueryResult};

/// Filter value types.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Float value.
    Float(f64),
    /// UUID value.
    Uuid(Uuid),
    /// String value.
    Text(String),
    /// List of values.
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Wrap raw parameter values: one value stays scalar, several become a list.
    pub fn from_strings(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            FilterValue::Text(values.remove(0))
        } else {
            FilterValue::List(values.into_iter().map(FilterValue::Text).collect())
        }
    }

    /// Convert into bindable statement values, flattening lists.
    pub fn to_values(&self) -> Vec<sea_query::Value> {
        match self {
            FilterValue::Text(s) => vec![s.clone().into()],
            FilterValue::Integer(i) => vec![(*i).into()],
            FilterValue::Float(f) => vec![(*f).into()],
            FilterValue::Boolean(b) => vec![(*b).into()],
            FilterValue::Uuid(u) => vec![(*u).into()],
            FilterValue::List(items) => items.iter().flat_map(FilterValue::to_values).collect(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Boolean(value)
    }
}

impl From<Uuid> for FilterValue {
    fn from(value: Uuid) -> Self {
        FilterValue::Uuid(value)
    }
}

/// A single validated predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Internal field name.
    pub field_name: String,
    /// Comparison symbol, e.g. `=` or `LIKE`.
    pub symbol: String,
    /// Already transformed value.
    pub value: FilterValue,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse a direction token; only the exact lowercase tokens are accepted.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// Sort specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Internal field name.
    pub field_name: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field_name: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field_name: field_name.into(),
            direction,
        }
    }
}

/// One page of a collection query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
    /// Matching rows before offset/limit. `None` until the executor counts.
    pub total: Option<u64>,
    /// Ordering, first entry is the primary key.
    pub sort: Vec<Sort>,
}

impl Window {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit,
            total: None,
            sort: Vec::new(),
        }
    }
}

/// Extra predicate applied to a preloaded relation.
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadCondition {
    /// Column on the related table.
    pub column: String,
    pub symbol: String,
    pub value: FilterValue,
}

/// Instruction to eagerly load a declared relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Preload {
    /// Relation name as declared on the entity schema.
    pub relation: String,
    pub conditions: Vec<PreloadCondition>,
}

impl Preload {
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            conditions: Vec::new(),
        }
    }

    /// Restrict the preloaded rows.
    pub fn with_condition(
        mut self,
        column: impl Into<String>,
        symbol: impl Into<String>,
        value: impl Into<FilterValue>,
    ) -> Self {
        self.conditions.push(PreloadCondition {
            column: column.into(),
            symbol: symbol.into(),
            value: value.into(),
        });
        self
    }
}

/// Entity reference plus preloads.
#[derive(Debug, Clone, PartialEq)]
pub struct PlainQuery {
    pub entity: EntityRef,
    pub preloads: Vec<Preload>,
}

/// Plain query plus filters.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredQuery {
    pub plain: PlainQuery,
    pub filters: Vec<Filter>,
}

/// Filtered query plus a pagination window.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedQuery {
    pub filtered: FilteredQuery,
    pub window: Window,
}

/// The validated query, one of three tiers.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySpec {
    Plain(PlainQuery),
    Filtered(FilteredQuery),
    Paginated(PaginatedQuery),
}

impl QuerySpec {
    pub fn plain(&self) -> &PlainQuery {
        match self {
            QuerySpec::Plain(plain) => plain,
            QuerySpec::Filtered(filtered) => &filtered.plain,
            QuerySpec::Paginated(paginated) => &paginated.filtered.plain,
        }
    }

    pub fn filters(&self) -> &[Filter] {
        match self {
            QuerySpec::Plain(_) => &[],
            QuerySpec::Filtered(filtered) => &filtered.filters,
            QuerySpec::Paginated(paginated) => &paginated.filtered.filters,
        }
    }

    pub fn window(&self) -> Option<&Window> {
        match self {
            QuerySpec::Paginated(paginated) => Some(&paginated.window),
            _ => None,
        }
    }
}

/// A single-use query: the validated spec and its outcome.
///
/// The outcome slot holds either the fetched rows or the error that stopped
/// execution, never both. It is written once; later writes are ignored.
#[derive(Debug)]
pub struct QueryDescription {
    spec: QuerySpec,
    outcome: Option<QueryResult<serde_json::Value>>,
}

impl QueryDescription {
    pub fn new(spec: QuerySpec) -> Self {
        Self {
            spec,
            outcome: None,
        }
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn entity(&self) -> &EntityRef {
        &self.spec.plain().entity
    }

    pub fn preloads(&self) -> &[Preload] {
        &self.spec.plain().preloads
    }

    pub fn filters(&self) -> &[Filter] {
        self.spec.filters()
    }

    pub fn window(&self) -> Option<&Window> {
        self.spec.window()
    }

    /// Record the counted total on the window, if this is a paginated query.
    pub fn set_total(&mut self, total: u64) {
        if let QuerySpec::Paginated(paginated) = &mut self.spec {
            paginated.window.total = Some(total);
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn error(&self) -> Option<&QueryError> {
        match &self.outcome {
            Some(Err(err)) => Some(err),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            Some(Ok(value)) => Some(value),
            _ => None,
        }
    }

    pub fn set_error(&mut self, err: QueryError) {
        if self.outcome.is_some() {
            tracing::warn!(
                entity = self.entity().type_name(),
                error = %err,
                "query outcome already set; ignoring error"
            );
            return;
        }
        self.outcome = Some(Err(err));
    }

    pub fn set_result(&mut self, result: serde_json::Value) {
        if self.outcome.is_some() {
            tracing::warn!(
                entity = self.entity().type_name(),
                "query outcome already set; ignoring result"
            );
            return;
        }
        self.outcome = Some(Ok(result));
    }

    /// Take the outcome, leaving the description unresolved.
    pub fn take_outcome(&mut self) -> Option<QueryResult<serde_json::Value>> {
        self.outcome.take()
    }

    /// Decode the attached result into the model's output shape.
    ///
    /// Returns `Ok(None)` when nothing has been attached yet.
    pub fn decode<M: Model>(&self) -> QueryResult<Option<M::Output>>
    where
        M::Output: DeserializeOwned,
    {
        match self.result() {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(QueryError::Decode),
            None => Ok(None),
        }
    }
}
