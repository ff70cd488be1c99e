//! Query error types.
//!
//! Every failure the engine can report is a variant of [`QueryError`].
//! Callers branch on [`QueryError::kind`] instead of matching messages.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Broad classification of a [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The builder or manager was set up incorrectly.
    Configuration,
    /// Client-supplied parameters were rejected.
    Parse,
    /// The executor could not translate or run the statement.
    Execution,
    /// No repository could handle the entity.
    Dispatch,
}

/// Errors raised while building, dispatching, or executing a query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("model not set")]
    ModelNotSet,

    #[error("model {entity} is not a collection")]
    NotACollection { entity: &'static str },

    #[error("invalid operator id: {token}")]
    InvalidOperator { token: String },

    #[error("invalid field name {field} for operator {token}")]
    OperatorFieldMismatch { field: String, token: String },

    #[error("default repository was not set")]
    DefaultRepositoryNotSet,

    #[error("invalid filter parameter: {key}")]
    InvalidFilter { key: String },

    #[error("multiple values not allowed for filter {key} ({count} given)")]
    InvalidMultipleValues { key: String, count: usize },

    #[error("invalid embed name requested: {name}")]
    InvalidEmbed {
        name: String,
        /// Relations resolved before the invalid name was reached.
        resolved: Vec<String>,
    },

    #[error("param {name} has invalid value{}", numeric_suffix(.numeric))]
    InvalidParamValue { name: String, numeric: bool },

    #[error("collection limit exceeded (max limit: {max})")]
    MaxLimitExceeded { max: u64 },

    #[error("unknown field name: {field}")]
    UnknownField { field: String },

    #[error("unknown relation: {relation}")]
    UnknownRelation { relation: String },

    #[error("could not decode query result")]
    Decode(#[source] serde_json::Error),

    #[error("store error")]
    Store(#[from] anyhow::Error),

    #[error("could not find repository for type {entity}")]
    RepositoryNotFound { entity: &'static str },
}

impl QueryError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::ModelNotSet
            | QueryError::NotACollection { .. }
            | QueryError::InvalidOperator { .. }
            | QueryError::OperatorFieldMismatch { .. }
            | QueryError::DefaultRepositoryNotSet => ErrorKind::Configuration,
            QueryError::InvalidFilter { .. }
            | QueryError::InvalidMultipleValues { .. }
            | QueryError::InvalidEmbed { .. }
            | QueryError::InvalidParamValue { .. }
            | QueryError::MaxLimitExceeded { .. } => ErrorKind::Parse,
            QueryError::UnknownField { .. }
            | QueryError::UnknownRelation { .. }
            | QueryError::Decode(_)
            | QueryError::Store(_) => ErrorKind::Execution,
            QueryError::RepositoryNotFound { .. } => ErrorKind::Dispatch,
        }
    }
}

fn numeric_suffix(numeric: &bool) -> &'static str {
    if *numeric { " must be numeric" } else { "" }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, message) = match self.kind() {
            ErrorKind::Parse => (StatusCode::BAD_REQUEST, self.to_string()),
            _ => {
                // Only client errors are echoed back.
                tracing::error!(error = ?self, "query failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Result type alias using QueryError.
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn numeric_param_message() {
        let err = QueryError::InvalidParamValue {
            name: "_limit".to_string(),
            numeric: true,
        };
        assert_eq!(
            err.to_string(),
            "param _limit has invalid value must be numeric"
        );

        let err = QueryError::InvalidParamValue {
            name: "_sort".to_string(),
            numeric: false,
        };
        assert_eq!(err.to_string(), "param _sort has invalid value");
    }

    #[test]
    fn kinds() {
        assert_eq!(QueryError::ModelNotSet.kind(), ErrorKind::Configuration);
        assert_eq!(
            QueryError::MaxLimitExceeded { max: 10_000 }.kind(),
            ErrorKind::Parse
        );
        let unknown = QueryError::UnknownField {
            field: "x".to_string(),
        };
        assert_eq!(unknown.kind(), ErrorKind::Execution);
        assert_eq!(
            QueryError::RepositoryNotFound { entity: "x" }.kind(),
            ErrorKind::Dispatch
        );
    }

    #[test]
    fn parse_errors_are_bad_requests() {
        let response = QueryError::InvalidFilter {
            key: "a:b:c".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = QueryError::Store(anyhow::anyhow!("connection reset")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
