//! HTTP route handlers.

pub mod exchange;
pub mod health;
pub mod helpers;
pub mod symbol;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(exchange::router())
        .merge(symbol::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
