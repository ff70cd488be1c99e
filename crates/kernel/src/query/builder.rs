//! Query builder.
//!
//! Turns untyped request parameters into a validated [`QueryDescription`]:
//! - `name=value` / `name:op=value` become filters on declared fields
//! - `_embed=relation` requests allow-listed relation preloads
//! - `_offset`, `_limit` and `_sort=name:asc|desc` shape collection pages
//!
//! Parameters naming fields the entity does not expose are ignored rather
//! than rejected. Malformed keys and values are rejected with typed errors.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::operator::{DEFAULT_OPERATOR, Operator, OperatorRegistry, ValueTransform};
use super::params::{
    EMBED_PARAM, LIMIT_PARAM, OFFSET_PARAM, ParameterSource, Parameters, SORT_PARAM, is_reserved,
};
use super::schema::{EntityRef, Model, queryable_fields};
use super::types::{
    Filter, FilterValue, FilteredQuery, PaginatedQuery, PlainQuery, Preload, QueryDescription,
    QuerySpec, Sort, SortDirection, Window,
};
use crate::error::{QueryError, QueryResult};

/// Hard ceiling for `_limit`.
pub const MAX_LIMIT: u64 = 10_000;

/// Limit used when `_limit` is absent or not positive.
pub const DEFAULT_LIMIT: u64 = 500;

/// Offset used when `_offset` is absent.
pub const DEFAULT_OFFSET: u64 = 0;

/// `name` or `name:op`.
///
/// # Panics
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static FILTER_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[a-zA-Z0-9][a-zA-Z0-9_]*)(?::(?P<op>[a-zA-Z]+))?$")
        .expect("valid regex literal")
});

/// `name:direction`.
///
/// # Panics
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static SORT_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[a-zA-Z0-9][a-zA-Z0-9_]*):(?P<direction>[a-zA-Z0-9]+)$")
        .expect("valid regex literal")
});

/// Builds query descriptions for one model.
///
/// Configure once, then call [`QueryBuilder::build`] per request. Building
/// never mutates the builder, so the same configuration always yields the
/// same description for the same parameters.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    model: Option<EntityRef>,
    operators: OperatorRegistry,
    allowed_embeds: BTreeMap<String, Preload>,
    collection: bool,
    default_sort: Vec<Sort>,
    preset_filters: Vec<Filter>,
    preloads: Vec<Preload>,
    parse_query_params: bool,
    parse_path_params: bool,
    parse_embedding: bool,
    appended: Parameters,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryBuilder {
    /// Create a builder with no model set.
    pub fn new() -> Self {
        Self {
            model: None,
            operators: OperatorRegistry::new(),
            allowed_embeds: BTreeMap::new(),
            collection: false,
            default_sort: Vec::new(),
            preset_filters: Vec::new(),
            preloads: Vec::new(),
            parse_query_params: true,
            parse_path_params: true,
            parse_embedding: false,
            appended: Parameters::new(),
        }
    }

    /// Create a builder for model `M`.
    ///
    /// Collection models (`Vec<E>`) produce paginated queries.
    pub fn for_model<M: Model>() -> Self {
        let mut builder = Self::new();
        builder.reset::<M>();
        builder
    }

    /// Discard all configuration and target model `M`.
    pub fn reset<M: Model>(&mut self) -> &mut Self {
        *self = Self::new();
        self.model = Some(EntityRef::of::<M>());
        self.collection = M::COLLECTION;
        self
    }

    /// Register a filter operator, replacing any with the same token.
    ///
    /// `field_pattern` restricts the external field names it applies to.
    pub fn register_operator(
        &mut self,
        token: &str,
        symbol: &str,
        transform: impl ValueTransform + 'static,
        field_pattern: Regex,
    ) -> &mut Self {
        self.operators.register(token, symbol, transform, field_pattern);
        self
    }

    /// Mark the target as a collection (paginated query).
    pub fn set_collection(&mut self, collection: bool) -> &mut Self {
        self.collection = collection;
        self
    }

    pub fn set_parse_query_params(&mut self, flag: bool) -> &mut Self {
        self.parse_query_params = flag;
        self
    }

    pub fn set_parse_path_params(&mut self, flag: bool) -> &mut Self {
        self.parse_path_params = flag;
        self
    }

    /// Honor `_embed` requests.
    pub fn set_parse_embedding(&mut self, flag: bool) -> &mut Self {
        self.parse_embedding = flag;
        self
    }

    /// Sort applied when the request names none. `field_name` is internal.
    pub fn add_default_sort(&mut self, field_name: &str, direction: SortDirection) -> &mut Self {
        self.default_sort.push(Sort::new(field_name, direction));
        self
    }

    /// Filter applied to every query, bypassing parameter validation.
    ///
    /// `field_name` is internal; the operator's field pattern must accept it.
    pub fn add_preset_filter(
        &mut self,
        field_name: &str,
        token: &str,
        value: impl Into<FilterValue>,
    ) -> QueryResult<&mut Self> {
        let operator = self
            .operators
            .get(token)
            .ok_or_else(|| QueryError::InvalidOperator {
                token: token.to_string(),
            })?;
        if !operator.field_matches(field_name) {
            return Err(QueryError::OperatorFieldMismatch {
                field: field_name.to_string(),
                token: token.to_string(),
            });
        }

        let filter = Filter {
            field_name: field_name.to_string(),
            symbol: operator.symbol().to_string(),
            value: value.into(),
        };
        self.preset_filters.push(filter);
        Ok(self)
    }

    /// Preload applied to every query.
    pub fn add_preload(&mut self, preload: Preload) -> &mut Self {
        self.preloads.push(preload);
        self
    }

    /// Allow `_embed=name` to preload `relation`.
    pub fn allow_embed(&mut self, name: &str, relation: &str) -> &mut Self {
        self.allow_embed_preload(name, Preload::new(relation))
    }

    /// Allow `_embed=name` to apply `preload`, conditions included.
    pub fn allow_embed_preload(&mut self, name: &str, preload: Preload) -> &mut Self {
        self.allowed_embeds.insert(name.to_string(), preload);
        self
    }

    /// Parameter that overrides request parameters of the same name.
    pub fn add_parameter<I, V>(&mut self, name: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.appended.insert(name, values.into_iter().map(Into::into).collect());
        self
    }

    /// Build the query description for one request.
    pub fn build(&self, source: &ParameterSource) -> QueryResult<QueryDescription> {
        let entity = self.model.ok_or(QueryError::ModelNotSet)?;
        if self.collection && !entity.is_collection() {
            return Err(QueryError::NotACollection {
                entity: entity.type_name(),
            });
        }

        let params = self.collect_parameters(source);
        let fields = queryable_fields(&entity);

        let plain = PlainQuery {
            entity,
            preloads: self.resolve_preloads(&params)?,
        };

        if !self.collection && fields.is_empty() && self.preset_filters.is_empty() {
            return Ok(QueryDescription::new(QuerySpec::Plain(plain)));
        }

        let mut filters = self.parse_filters(&params, &fields)?;
        filters.extend(self.preset_filters.iter().cloned());
        let filtered = FilteredQuery { plain, filters };

        if !self.collection {
            return Ok(QueryDescription::new(QuerySpec::Filtered(filtered)));
        }

        let mut window = parse_window(&params)?;
        window.sort = parse_sorts(&params, &fields)?;
        if window.sort.is_empty() {
            window.sort = self.default_sort.clone();
        }

        let paginated = PaginatedQuery { filtered, window };
        Ok(QueryDescription::new(QuerySpec::Paginated(paginated)))
    }

    /// Merge request parameters: query, then path, then appended.
    fn collect_parameters(&self, source: &ParameterSource) -> Parameters {
        let mut params = Parameters::new();
        if self.parse_query_params {
            params.overlay(&source.query);
        }
        if self.parse_path_params {
            params.overlay(&source.path);
        }
        params.overlay(&self.appended);
        params
    }

    fn resolve_preloads(&self, params: &Parameters) -> QueryResult<Vec<Preload>> {
        let mut preloads = self.preloads.clone();
        if !self.parse_embedding {
            return Ok(preloads);
        }

        for name in params.get(EMBED_PARAM).unwrap_or_default() {
            let Some(preload) = self.allowed_embeds.get(name) else {
                return Err(QueryError::InvalidEmbed {
                    name: name.clone(),
                    resolved: preloads.iter().map(|p| p.relation.clone()).collect(),
                });
            };
            if !preloads.contains(preload) {
                preloads.push(preload.clone());
            }
        }

        Ok(preloads)
    }

    fn parse_filters(
        &self,
        params: &Parameters,
        fields: &BTreeMap<String, String>,
    ) -> QueryResult<Vec<Filter>> {
        let mut filters = Vec::new();

        for (key, values) in params.iter().filter(|(key, _)| !is_reserved(key)) {
            let (name, operator) = self
                .parse_filter_key(key)
                .ok_or_else(|| QueryError::InvalidFilter { key: key.clone() })?;

            // One value per field; OR-lists are not supported.
            if values.len() > 1 {
                return Err(QueryError::InvalidMultipleValues {
                    key: key.clone(),
                    count: values.len(),
                });
            }

            let Some(field_name) = fields.get(name) else {
                debug!(param = %key, "ignoring parameter for unknown field");
                continue;
            };
            if !operator.field_matches(name) {
                debug!(param = %key, "ignoring parameter the operator does not accept");
                continue;
            }
            // Only appended parameters can be empty; request parsing yields a value per key.
            if values.is_empty() {
                debug!(param = %key, "ignoring parameter without a value");
                continue;
            }

            filters.push(Filter {
                field_name: field_name.clone(),
                symbol: operator.symbol().to_string(),
                value: operator.transform_value(values.clone()),
            });
        }

        Ok(filters)
    }

    /// Split `name[:op]` into the field name and its operator.
    fn parse_filter_key<'k>(&self, key: &'k str) -> Option<(&'k str, &Operator)> {
        let captures = FILTER_KEY.captures(key)?;
        let name = captures.name("name")?.as_str();
        let token = captures
            .name("op")
            .map_or(DEFAULT_OPERATOR, |op| op.as_str());
        let operator = self.operators.get(token)?;
        Some((name, operator))
    }
}

fn parse_window(params: &Parameters) -> QueryResult<Window> {
    let offset = numeric_param(params, OFFSET_PARAM)?;
    let limit = numeric_param(params, LIMIT_PARAM)?;

    let limit = match limit {
        Some(limit) if limit > MAX_LIMIT as i64 => {
            return Err(QueryError::MaxLimitExceeded { max: MAX_LIMIT });
        }
        Some(limit) if limit > 0 => limit as u64,
        _ => DEFAULT_LIMIT,
    };
    let offset = offset.map_or(DEFAULT_OFFSET, |offset| u64::try_from(offset).unwrap_or(0));

    Ok(Window::new(offset, limit))
}

fn numeric_param(params: &Parameters, name: &str) -> QueryResult<Option<i64>> {
    params
        .first(name)
        .map(str::parse::<i64>)
        .transpose()
        .map_err(|_| QueryError::InvalidParamValue {
            name: name.to_string(),
            numeric: true,
        })
}

/// Parse `_sort=name:direction` values, keeping their order.
fn parse_sorts(params: &Parameters, fields: &BTreeMap<String, String>) -> QueryResult<Vec<Sort>> {
    let invalid = || QueryError::InvalidParamValue {
        name: SORT_PARAM.to_string(),
        numeric: false,
    };

    params
        .get(SORT_PARAM)
        .unwrap_or_default()
        .iter()
        .map(|value| {
            let captures = SORT_VALUE.captures(value).ok_or_else(invalid)?;
            let name = captures.name("name").ok_or_else(invalid)?.as_str();
            let token = captures.name("direction").ok_or_else(invalid)?.as_str();

            let field_name = fields.get(name).ok_or_else(invalid)?;
            let direction = SortDirection::parse(token).ok_or_else(invalid)?;

            Ok(Sort::new(field_name.clone(), direction))
        })
        .collect()
}
