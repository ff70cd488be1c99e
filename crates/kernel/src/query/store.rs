//! Statement execution.
//!
//! The handler renders statements to SQL; a [`Store`] runs them. Keeping the
//! seam at rendered SQL lets tests record statements without a database.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

/// Statements for one round trip: an optional count and the row fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRequest {
    /// `SELECT COUNT(*) ...` over the filtered rows, for paginated queries.
    pub count: Option<String>,
    /// Row fetch; each row is returned as one JSON object.
    pub select: String,
}

impl StoreRequest {
    pub fn select(select: String) -> Self {
        Self {
            count: None,
            select,
        }
    }

    pub fn counted(count: String, select: String) -> Self {
        Self {
            count: Some(count),
            select,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreResponse {
    /// Present when the request carried a count statement.
    pub total: Option<u64>,
    pub rows: Vec<serde_json::Value>,
}

/// Executes rendered statements.
#[async_trait]
pub trait Store: Send + Sync {
    async fn run(&self, request: StoreRequest) -> Result<StoreResponse>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn run(&self, request: StoreRequest) -> Result<StoreResponse> {
        (**self).run(request).await
    }
}

/// PostgreSQL store.
///
/// Count and fetch share one transaction so both see the same snapshot and
/// the statement timeout stays local to it.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn run(&self, request: StoreRequest) -> Result<StoreResponse> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        // SET does not take bind parameters; the value is a formatted integer.
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}ms'",
            self.statement_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .context("failed to set statement timeout")?;

        let total = match &request.count {
            Some(count_sql) => {
                debug!(sql = %count_sql, "count");
                let total: i64 = sqlx::query_scalar(count_sql)
                    .fetch_one(&mut *tx)
                    .await
                    .context("failed to execute count query")?;
                Some(u64::try_from(total).unwrap_or(0))
            }
            None => None,
        };

        debug!(sql = %request.select, "select");
        let rows: Vec<serde_json::Value> = sqlx::query_scalar(&format!(
            "SELECT row_to_json(t) FROM ({}) t",
            request.select
        ))
        .fetch_all(&mut *tx)
        .await
        .context("failed to execute select query")?;

        tx.commit()
            .await
            .context("failed to commit query transaction")?;

        Ok(StoreResponse { total, rows })
    }
}
