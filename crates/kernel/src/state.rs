//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::query::{PgStore, QueryHandler, QueryManager};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// PostgreSQL connection pool.
    db: PgPool,

    /// Routes query descriptions to repositories.
    queries: QueryManager,
}

impl AppState {
    /// Connect to the database and register the default repository.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = db::create_pool(config)
            .await
            .context("failed to create database pool")?;

        let store = PgStore::new(db.clone(), config.statement_timeout);
        let queries = QueryManager::with_default(QueryHandler::new(store).into_shared());

        info!(
            statement_timeout_ms = config.statement_timeout.as_millis() as u64,
            "query manager ready"
        );
        Ok(Self::from_parts(db, queries))
    }

    /// Assemble state from an existing pool and manager.
    pub fn from_parts(db: PgPool, queries: QueryManager) -> Self {
        Self {
            inner: Arc::new(AppStateInner { db, queries }),
        }
    }

    pub fn queries(&self) -> &QueryManager {
        &self.inner.queries
    }

    /// Check if PostgreSQL is healthy.
    pub async fn postgres_healthy(&self) -> bool {
        db::check_health(&self.inner.db).await
    }
}
