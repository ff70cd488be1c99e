//! Query executor.
//!
//! Translates a [`QueryDescription`] into SeaQuery statements, runs them on a
//! [`Store`], and attaches the rows (or the error) to the description.
//!
//! Every field, sort, and relation is resolved before the first statement
//! runs, so a bad description never reaches the database.

use std::sync::Arc;

use async_trait::async_trait;
use sea_query::{
    Alias, Asterisk, Expr, ExprTrait, Order, PostgresQueryBuilder, Query, SelectStatement,
    SimpleExpr,
};
use serde_json::Value;
use tracing::warn;

use super::manager::Repository;
use super::schema::{Cardinality, Entity, EntityRef, EntitySchema, column_map};
use super::store::{Store, StoreRequest};
use super::types::{FilterValue, Preload, PreloadCondition, QueryDescription, SortDirection};
use crate::error::{QueryError, QueryResult};

/// Generic repository backed by a [`Store`].
pub struct QueryHandler<S> {
    store: S,
    /// Entities this handler answers for; empty means all.
    entities: Vec<EntityRef>,
}

impl<S: Store> QueryHandler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            entities: Vec::new(),
        }
    }

    /// Restrict the handler to entity `E` (in addition to earlier restrictions).
    pub fn only<E: Entity>(mut self) -> Self {
        self.entities.push(EntityRef::of::<E>());
        self
    }

    pub fn into_shared(self) -> Arc<dyn Repository>
    where
        S: 'static,
    {
        Arc::new(self)
    }

    async fn execute(&self, query: &QueryDescription) -> QueryResult<Executed> {
        let plan = SelectPlan::new(query)?;

        let response = self.store.run(plan.request.clone()).await?;
        let mut rows = response.rows;

        for preload in &plan.preloads {
            self.load_relation(preload, &mut rows).await?;
        }

        let value = if plan.collection {
            Value::Array(rows)
        } else {
            rows.into_iter().next().unwrap_or(Value::Null)
        };

        Ok(Executed {
            total: response.total,
            value,
        })
    }

    /// Fetch related rows for all parents in one statement and embed them.
    async fn load_relation(&self, preload: &PreloadPlan, rows: &mut [Value]) -> QueryResult<()> {
        let mut keys: Vec<&Value> = Vec::new();
        for key in rows.iter().filter_map(|row| row.get(preload.local_key)) {
            if !key.is_null() && !keys.contains(&key) {
                keys.push(key);
            }
        }

        let children = if keys.is_empty() {
            Vec::new()
        } else {
            let values = keys.into_iter().filter_map(json_to_sql).collect();
            self.store
                .run(StoreRequest::select(preload.statement(values)))
                .await?
                .rows
        };

        for row in rows.iter_mut() {
            let parent_key = row.get(preload.local_key).cloned().unwrap_or(Value::Null);
            let matching = children.iter().filter(|child| {
                !parent_key.is_null() && child.get(preload.foreign_key) == Some(&parent_key)
            });

            let embedded = match preload.cardinality {
                Cardinality::One => matching.cloned().next().unwrap_or(Value::Null),
                Cardinality::Many => Value::Array(matching.cloned().collect()),
            };

            if let Some(object) = row.as_object_mut() {
                object.insert(preload.name.clone(), embedded);
            } else {
                warn!(relation = %preload.name, "cannot embed relation into non-object row");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl<S: Store> Repository for QueryHandler<S> {
    fn supports(&self, entity: &EntityRef) -> bool {
        self.entities.is_empty() || self.entities.iter().any(|e| e.same_entity(entity))
    }

    async fn handle(&self, mut query: QueryDescription) -> QueryDescription {
        if query.is_resolved() {
            return query;
        }

        match self.execute(&query).await {
            Ok(executed) => {
                if let Some(total) = executed.total {
                    query.set_total(total);
                }
                query.set_result(executed.value);
            }
            Err(err) => query.set_error(err),
        }
        query
    }
}

struct Executed {
    total: Option<u64>,
    value: Value,
}

/// Validated statements for one query description.
#[derive(Debug)]
pub struct SelectPlan {
    pub request: StoreRequest,
    pub preloads: Vec<PreloadPlan>,
    collection: bool,
}

impl SelectPlan {
    /// Resolve the description against its entity schema and render statements.
    pub fn new(query: &QueryDescription) -> QueryResult<Self> {
        let entity = query.entity();
        let schema = entity.schema();
        let columns = column_map(&schema);
        let column = |field: &str| {
            columns
                .get(field)
                .copied()
                .ok_or_else(|| QueryError::UnknownField {
                    field: field.to_string(),
                })
        };

        let mut select = select_fields(&schema);
        for filter in query.filters() {
            select.and_where(predicate(
                schema.table,
                column(&filter.field_name)?,
                &filter.symbol,
                &filter.value,
            ));
        }

        let preloads = query
            .preloads()
            .iter()
            .map(|preload| PreloadPlan::new(&schema, preload))
            .collect::<QueryResult<Vec<_>>>()?;

        let request = match query.window() {
            Some(window) => {
                let mut count = select.clone();
                count.clear_selects();
                count.expr(Expr::col(Asterisk).count());

                for sort in &window.sort {
                    let order = match sort.direction {
                        SortDirection::Asc => Order::Asc,
                        SortDirection::Desc => Order::Desc,
                    };
                    let sort_column = Alias::new(column(&sort.field_name)?);
                    select.order_by((Alias::new(schema.table), sort_column), order);
                }
                if window.offset > 0 {
                    select.offset(window.offset);
                }
                select.limit(window.limit);

                StoreRequest::counted(
                    count.to_string(PostgresQueryBuilder),
                    select.to_string(PostgresQueryBuilder),
                )
            }
            None => {
                if !entity.is_collection() {
                    select.limit(1);
                }
                StoreRequest::select(select.to_string(PostgresQueryBuilder))
            }
        };

        Ok(Self {
            request,
            preloads,
            collection: entity.is_collection(),
        })
    }
}

/// A resolved relation preload.
#[derive(Debug)]
pub struct PreloadPlan {
    /// Key the related rows are embedded under.
    name: String,
    cardinality: Cardinality,
    /// Parent row key holding the join value.
    local_key: &'static str,
    /// Child row key holding the join value.
    foreign_key: &'static str,
    target: EntitySchema,
    foreign_column: &'static str,
    conditions: Vec<PreloadCondition>,
}

impl PreloadPlan {
    fn new(schema: &EntitySchema, preload: &Preload) -> QueryResult<Self> {
        let relation = schema
            .relation(&preload.relation)
            .ok_or_else(|| QueryError::UnknownRelation {
                relation: preload.relation.clone(),
            })?;
        let target = relation.target();

        let local_key = schema
            .field_for_column(relation.local_column)
            .map(|f| f.name)
            .ok_or_else(|| QueryError::UnknownField {
                field: relation.local_column.to_string(),
            })?;
        let foreign_key = target
            .field_for_column(relation.foreign_column)
            .map(|f| f.name)
            .ok_or_else(|| QueryError::UnknownField {
                field: relation.foreign_column.to_string(),
            })?;

        for condition in &preload.conditions {
            if target.field_for_column(&condition.column).is_none() {
                return Err(QueryError::UnknownField {
                    field: condition.column.clone(),
                });
            }
        }

        Ok(Self {
            name: relation.name.to_string(),
            cardinality: relation.cardinality,
            local_key,
            foreign_key,
            foreign_column: relation.foreign_column,
            target,
            conditions: preload.conditions.clone(),
        })
    }

    /// Select the related rows whose join column is one of `keys`.
    fn statement(&self, keys: Vec<sea_query::Value>) -> String {
        let mut select = select_fields(&self.target);
        let table = Alias::new(self.target.table);
        let column = Alias::new(self.foreign_column);
        select.and_where(Expr::col((table, column)).is_in(keys));
        for condition in &self.conditions {
            select.and_where(predicate(
                self.target.table,
                &condition.column,
                &condition.symbol,
                &condition.value,
            ));
        }
        select.to_string(PostgresQueryBuilder)
    }
}

/// `SELECT "table"."column" AS "field", ... FROM "table"`.
fn select_fields(schema: &EntitySchema) -> SelectStatement {
    let mut select = Query::select();
    if schema.fields.is_empty() {
        select.column(Asterisk);
    }
    for field in &schema.fields {
        select.expr_as(
            Expr::col((Alias::new(schema.table), Alias::new(field.column))),
            Alias::new(field.name),
        );
    }
    select.from(Alias::new(schema.table));
    select
}

/// `"table"."column" <symbol> <value>`, with list values rendered as a tuple.
fn predicate(table: &str, column: &str, symbol: &str, value: &FilterValue) -> SimpleExpr {
    let values = value.to_values();
    let placeholder = match value {
        FilterValue::List(_) if values.is_empty() => "(NULL)".to_string(),
        FilterValue::List(_) => format!(
            "({})",
            (1..=values.len())
                .map(|i| format!("${i}"))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        _ => "$1".to_string(),
    };

    Expr::cust_with_values(
        format!("\"{table}\".\"{column}\" {symbol} {placeholder}"),
        values,
    )
}

fn json_to_sql(value: &Value) -> Option<sea_query::Value> {
    match value {
        Value::String(s) => Some(s.clone().into()),
        Value::Bool(b) => Some((*b).into()),
        Value::Number(n) => n
            .as_i64()
            .map(Into::into)
            .or_else(|| n.as_f64().map(Into::into)),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::query::builder::QueryBuilder;
    use crate::query::params::ParameterSource;
    use crate::query::schema::FieldDef;
    use crate::query::store::StoreResponse;
    use crate::query::types::{Filter, FilteredQuery, PlainQuery, QuerySpec};
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Deserialize)]
    struct Venue {}

    impl Entity for Venue {
        fn schema() -> EntitySchema {
            EntitySchema::new("venue")
                .field(FieldDef::new("code").external("code"))
                .field(FieldDef::new("active"))
                .has_many::<Instrument>("instruments", "code", "venue_id")
        }
    }

    #[derive(Debug, Deserialize)]
    struct Instrument {}

    impl Entity for Instrument {
        fn schema() -> EntitySchema {
            EntitySchema::new("instrument")
                .field(FieldDef::new("ticker").external("ticker"))
                .field(FieldDef::new("title").external("name").column("long_name"))
                .field(FieldDef::new("venue").external("venue").column("venue_id"))
                .belongs_to::<Venue>("venue_info", "venue_id", "code")
        }
    }

    /// Records requests and replays canned responses in order.
    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<StoreRequest>>,
        responses: Mutex<VecDeque<StoreResponse>>,
    }

    impl Recorder {
        fn replying(responses: Vec<StoreResponse>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl Store for Recorder {
        async fn run(&self, request: StoreRequest) -> anyhow::Result<StoreResponse> {
            self.requests.lock().unwrap().push(request);
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }
    }

    fn build(builder: &QueryBuilder, query: &str) -> QueryDescription {
        builder
            .build(&ParameterSource::from_query_str(query))
            .unwrap()
    }

    #[test]
    fn paginated_statements() {
        let query = build(
            &QueryBuilder::for_model::<Vec<Instrument>>(),
            "name=Apple&_sort=name:desc&_sort=ticker:asc&_offset=20&_limit=10",
        );
        let plan = SelectPlan::new(&query).unwrap();

        let count = plan.request.count.unwrap();
        assert!(
            count.starts_with("SELECT COUNT(*) FROM \"instrument\""),
            "{count}"
        );
        assert!(
            count.contains("\"instrument\".\"long_name\" = 'Apple'"),
            "{count}"
        );
        assert!(!count.contains("LIMIT"), "{count}");

        let select = plan.request.select;
        assert!(
            select.contains("\"instrument\".\"long_name\" AS \"title\""),
            "{select}"
        );
        assert!(
            select.contains("\"instrument\".\"long_name\" = 'Apple'"),
            "{select}"
        );
        assert!(
            select.contains(
                "ORDER BY \"instrument\".\"long_name\" DESC, \"instrument\".\"ticker\" ASC"
            ),
            "{select}"
        );
        assert!(select.contains("LIMIT 10"), "{select}");
        assert!(select.contains("OFFSET 20"), "{select}");
    }

    #[test]
    fn zero_offset_is_omitted() {
        let query = build(&QueryBuilder::for_model::<Vec<Instrument>>(), "");
        let select = SelectPlan::new(&query).unwrap().request.select;
        assert!(select.contains("LIMIT 500"), "{select}");
        assert!(!select.contains("OFFSET"), "{select}");
    }

    #[test]
    fn single_entity_fetches_one_row() {
        let query = build(&QueryBuilder::for_model::<Instrument>(), "ticker=AAPL");
        let request = SelectPlan::new(&query).unwrap().request;
        assert!(request.count.is_none());
        assert!(request.select.contains("LIMIT 1"), "{}", request.select);
    }

    #[test]
    fn list_values_render_as_tuple() {
        let expr = predicate(
            "instrument",
            "ticker",
            "IN",
            &FilterValue::List(vec!["AAPL".into(), "MSFT".into()]),
        );
        let mut select = Query::select();
        select
            .column(Asterisk)
            .from(Alias::new("instrument"))
            .and_where(expr);
        let sql = select.to_string(PostgresQueryBuilder);
        assert!(
            sql.contains("\"instrument\".\"ticker\" IN ('AAPL', 'MSFT')"),
            "{sql}"
        );
    }

    #[test]
    fn unknown_fields_and_relations_fail_before_execution() {
        let spec = QuerySpec::Filtered(FilteredQuery {
            plain: PlainQuery {
                entity: EntityRef::of::<Instrument>(),
                preloads: Vec::new(),
            },
            filters: vec![Filter {
                field_name: "colour".to_string(),
                symbol: "=".to_string(),
                value: "red".into(),
            }],
        });
        let err = SelectPlan::new(&QueryDescription::new(spec)).unwrap_err();
        assert!(matches!(err, QueryError::UnknownField { ref field } if field == "colour"));

        let spec = QuerySpec::Plain(PlainQuery {
            entity: EntityRef::of::<Instrument>(),
            preloads: vec![Preload::new("quotes")],
        });
        let err = SelectPlan::new(&QueryDescription::new(spec)).unwrap_err();
        assert!(matches!(err, QueryError::UnknownRelation { .. }));
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[tokio::test]
    async fn errors_are_attached_without_touching_the_store() {
        let recorder = Arc::new(Recorder::default());
        let handler = QueryHandler::new(Arc::clone(&recorder));

        let spec = QuerySpec::Plain(PlainQuery {
            entity: EntityRef::of::<Vec<Instrument>>(),
            preloads: vec![Preload::new("nope")],
        });
        let handled = handler.handle(QueryDescription::new(spec)).await;

        assert!(matches!(handled.error(), Some(QueryError::UnknownRelation { .. })));
        assert!(recorder.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn total_and_rows_are_attached() {
        let recorder = Arc::new(Recorder::replying(vec![StoreResponse {
            total: Some(25),
            rows: vec![json!({"ticker": "AAPL"}), json!({"ticker": "MSFT"})],
        }]));
        let handler = QueryHandler::new(Arc::clone(&recorder));

        let query = build(&QueryBuilder::for_model::<Vec<Instrument>>(), "_limit=2");
        let handled = handler.handle(query).await;

        assert_eq!(handled.window().unwrap().total, Some(25));
        assert_eq!(handled.result().unwrap().as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_single_row_is_null() {
        let recorder = Arc::new(Recorder::default());
        let handler = QueryHandler::new(Arc::clone(&recorder));

        let query = build(&QueryBuilder::for_model::<Instrument>(), "ticker=NOPE");
        let handled = handler.handle(query).await;
        assert_eq!(handled.result(), Some(&Value::Null));
    }

    #[tokio::test]
    async fn belongs_to_preload_is_batched() {
        let recorder = Arc::new(Recorder::replying(vec![
            StoreResponse {
                total: Some(3),
                rows: vec![
                    json!({"ticker": "AAPL", "venue": "XNAS"}),
                    json!({"ticker": "MSFT", "venue": "XNAS"}),
                    json!({"ticker": "SAP", "venue": "XETR"}),
                ],
            },
            StoreResponse {
                total: None,
                rows: vec![json!({"code": "XNAS"}), json!({"code": "XETR"})],
            },
        ]));
        let handler = QueryHandler::new(Arc::clone(&recorder));

        let mut builder = QueryBuilder::for_model::<Vec<Instrument>>();
        builder.add_preload(Preload::new("venue_info"));
        let handled = handler.handle(build(&builder, "")).await;

        let requests = recorder.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        let preload_sql = &requests[1].select;
        assert!(preload_sql.contains("FROM \"venue\""), "{preload_sql}");
        assert!(
            preload_sql.contains("\"venue\".\"code\" IN ('XNAS', 'XETR')"),
            "{preload_sql}"
        );

        let rows = handled.result().unwrap().as_array().unwrap();
        assert_eq!(rows[0]["venue_info"], json!({"code": "XNAS"}));
        assert_eq!(rows[2]["venue_info"], json!({"code": "XETR"}));
    }

    #[tokio::test]
    async fn has_many_preload_with_condition() {
        let recorder = Arc::new(Recorder::replying(vec![
            StoreResponse {
                total: None,
                rows: vec![json!({"code": "XNAS"})],
            },
            StoreResponse {
                total: None,
                rows: vec![
                    json!({"ticker": "AAPL", "venue": "XNAS"}),
                    json!({"ticker": "MSFT", "venue": "XNAS"}),
                ],
            },
        ]));
        let handler = QueryHandler::new(Arc::clone(&recorder));

        let mut builder = QueryBuilder::for_model::<Venue>();
        builder.add_preload(
            Preload::new("instruments").with_condition("long_name", "<>", "delisted"),
        );
        let handled = handler.handle(build(&builder, "code=XNAS")).await;

        let requests = recorder.requests.lock().unwrap().clone();
        let preload_sql = &requests[1].select;
        assert!(
            preload_sql.contains("\"instrument\".\"long_name\" <> 'delisted'"),
            "{preload_sql}"
        );

        let venue = handled.result().unwrap();
        assert_eq!(venue["instruments"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn preload_without_parents_skips_the_store() {
        let recorder = Arc::new(Recorder::default());
        let handler = QueryHandler::new(Arc::clone(&recorder));

        let mut builder = QueryBuilder::for_model::<Vec<Instrument>>();
        builder.add_preload(Preload::new("venue_info"));
        let handled = handler.handle(build(&builder, "")).await;

        assert_eq!(recorder.requests.lock().unwrap().len(), 1);
        assert_eq!(handled.result(), Some(&json!([])));
    }

    #[test]
    fn restricted_handler_supports_listed_entities() {
        let handler = QueryHandler::new(Arc::new(Recorder::default())).only::<Venue>();
        assert!(handler.supports(&EntityRef::of::<Venue>()));
        assert!(handler.supports(&EntityRef::of::<Vec<Venue>>()));
        assert!(!handler.supports(&EntityRef::of::<Instrument>()));

        let handler = QueryHandler::new(Arc::new(Recorder::default()));
        assert!(handler.supports(&EntityRef::of::<Instrument>()));
    }
}
