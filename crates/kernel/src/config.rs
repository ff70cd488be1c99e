//! Configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Per-request statement timeout (default: 10s).
    pub statement_timeout: Duration,

    /// Database statement log level, from `DB_LOGGING` (default: off).
    pub db_logging: DbLogLevel,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let statement_timeout_ms: u64 = env::var("STATEMENT_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .context("STATEMENT_TIMEOUT_MS must be a valid u64")?;

        let db_logging = env::var("DB_LOGGING")
            .map(|v| DbLogLevel::parse(&v))
            .unwrap_or_default();

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            statement_timeout: Duration::from_millis(statement_timeout_ms),
            db_logging,
        })
    }
}

/// How much database activity to log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DbLogLevel {
    #[default]
    Silent,
    Error,
    Warn,
    Info,
}

impl DbLogLevel {
    /// Parse a level name; unknown names silence database logging.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "error" => DbLogLevel::Error,
            "warn" | "warning" => DbLogLevel::Warn,
            "info" | "debug" | "trace" => DbLogLevel::Info,
            _ => DbLogLevel::Silent,
        }
    }

    /// Directive value for the `sqlx` target of an `EnvFilter`.
    pub fn directive(self) -> &'static str {
        match self {
            DbLogLevel::Silent => "off",
            DbLogLevel::Error => "error",
            DbLogLevel::Warn => "warn",
            DbLogLevel::Info => "info",
        }
    }
}
