//! Symbol endpoints.

use std::collections::HashMap;
use std::sync::LazyLock;

use axum::Router;
use axum::extract::{Path, RawQuery, State};
use axum::http::Uri;
use axum::response::{Json, Response};
use axum::routing::get;

use super::helpers::{fetch_collection, fetch_one, parameter_source};
use crate::error::QueryError;
use crate::models::Symbol;
use crate::query::QueryBuilder;
use crate::render::Collection;
use crate::state::AppState;

static LIST: LazyLock<QueryBuilder> = LazyLock::new(Symbol::list_query);
static LOOKUP: LazyLock<QueryBuilder> = LazyLock::new(Symbol::lookup_query);

/// Create the symbol router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/symbols", get(list_symbols))
        .route("/symbols/{ticker}", get(get_symbol))
        // The path segment becomes an `exchange_code` filter.
        .route(
            "/exchanges/{exchange_code}/symbols",
            get(list_symbols_by_exchange),
        )
}

async fn list_symbols(
    State(state): State<AppState>,
    uri: Uri,
    RawQuery(query): RawQuery,
) -> Result<Json<Collection<Symbol>>, QueryError> {
    let source = parameter_source(HashMap::new(), query);
    fetch_collection(&state, &LIST, &source, uri.path()).await
}

async fn list_symbols_by_exchange(
    State(state): State<AppState>,
    uri: Uri,
    Path(path): Path<HashMap<String, String>>,
    RawQuery(query): RawQuery,
) -> Result<Json<Collection<Symbol>>, QueryError> {
    let source = parameter_source(path, query);
    fetch_collection(&state, &LIST, &source, uri.path()).await
}

async fn get_symbol(
    State(state): State<AppState>,
    uri: Uri,
    Path(path): Path<HashMap<String, String>>,
    RawQuery(query): RawQuery,
) -> Result<Response, QueryError> {
    let source = parameter_source(path, query);
    fetch_one::<Symbol>(&state, &LOOKUP, &source, uri.path()).await
}
