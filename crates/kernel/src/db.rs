//! PostgreSQL pool bootstrap.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::config::Config;

/// Connect the pool backing the query store.
///
/// Acquiring a connection is bounded by the same timeout as statements, so a
/// saturated pool fails a request instead of queueing it indefinitely.
pub async fn create_pool(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(config.statement_timeout)
        .connect(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;

    info!(
        max_connections = config.database_max_connections,
        "database pool ready"
    );
    Ok(pool)
}

/// Whether the pool can run a trivial statement.
pub async fn check_health(pool: &PgPool) -> bool {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .is_ok_and(|one| one == 1)
}
