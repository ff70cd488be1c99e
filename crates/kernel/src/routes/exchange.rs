//! Exchange endpoints.

use std::collections::HashMap;
use std::sync::LazyLock;

use axum::Router;
use axum::extract::{Path, RawQuery, State};
use axum::http::Uri;
use axum::response::{Json, Response};
use axum::routing::get;

use super::helpers::{fetch_collection, fetch_one, parameter_source};
use crate::error::QueryError;
use crate::models::Exchange;
use crate::query::QueryBuilder;
use crate::render::Collection;
use crate::state::AppState;

static LIST: LazyLock<QueryBuilder> = LazyLock::new(Exchange::list_query);
static LOOKUP: LazyLock<QueryBuilder> = LazyLock::new(Exchange::lookup_query);

/// Create the exchange router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/exchanges", get(list_exchanges))
        .route("/exchanges/{code}", get(get_exchange))
}

async fn list_exchanges(
    State(state): State<AppState>,
    uri: Uri,
    RawQuery(query): RawQuery,
) -> Result<Json<Collection<Exchange>>, QueryError> {
    let source = parameter_source(HashMap::new(), query);
    fetch_collection(&state, &LIST, &source, uri.path()).await
}

async fn get_exchange(
    State(state): State<AppState>,
    uri: Uri,
    Path(path): Path<HashMap<String, String>>,
    RawQuery(query): RawQuery,
) -> Result<Response, QueryError> {
    let source = parameter_source(path, query);
    fetch_one::<Exchange>(&state, &LOOKUP, &source, uri.path()).await
}
