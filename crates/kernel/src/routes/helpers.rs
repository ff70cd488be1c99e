//! Shared helpers for query-backed route handlers.

use std::collections::HashMap;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{QueryError, QueryResult};
use crate::query::{Entity, ParameterSource, Parameters, QueryBuilder, QueryDescription, Window};
use crate::render::{Collection, Resource};
use crate::state::AppState;

/// Combine path parameters and the raw query string of one request.
pub fn parameter_source(path: HashMap<String, String>, query: Option<String>) -> ParameterSource {
    ParameterSource::new(
        query.as_deref().map(Parameters::parse).unwrap_or_default(),
        path.into_iter().collect(),
    )
}

/// Build, dispatch, and surface the attached error if there is one.
async fn run(
    state: &AppState,
    builder: &QueryBuilder,
    source: &ParameterSource,
) -> QueryResult<QueryDescription> {
    let query = builder.build(source)?;
    let mut query = state.queries().dispatch(query).await?;

    if query.error().is_some()
        && let Some(Err(err)) = query.take_outcome()
    {
        return Err(err);
    }
    Ok(query)
}

/// Run a collection query and render one page.
pub async fn fetch_collection<E>(
    state: &AppState,
    builder: &QueryBuilder,
    source: &ParameterSource,
    path: &str,
) -> QueryResult<Json<Collection<E>>>
where
    E: Entity + Serialize,
{
    let query = run(state, builder, source).await?;
    let items = query.decode::<Vec<E>>()?.unwrap_or_default();
    let window = query
        .window()
        .cloned()
        .unwrap_or_else(|| Window::new(0, items.len() as u64));

    Ok(Json(Collection::new(items, &window, path)))
}

/// Run a single-entity query; 404 when nothing matches.
pub async fn fetch_one<E>(
    state: &AppState,
    builder: &QueryBuilder,
    source: &ParameterSource,
    path: &str,
) -> Result<Response, QueryError>
where
    E: Entity + Serialize + DeserializeOwned,
{
    let query = run(state, builder, source).await?;

    match query.decode::<E>()?.flatten() {
        Some(item) => Ok(Json(Resource::new(item, path)).into_response()),
        None => Ok(not_found()),
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse { error: "not found" }),
    )
        .into_response()
}
