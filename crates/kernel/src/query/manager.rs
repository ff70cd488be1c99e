//! Repository dispatch.
//!
//! A [`QueryManager`] routes each query description to the first registered
//! repository that supports its entity, falling back to a default repository.
//!
//! Registration order matters: a broad repository registered before a
//! narrow one shadows it for every entity both support.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::schema::EntityRef;
use super::types::QueryDescription;
use crate::error::{QueryError, QueryResult};

/// Executes query descriptions for the entities it supports.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Whether this repository can execute queries for `entity`.
    fn supports(&self, entity: &EntityRef) -> bool;

    /// Execute the query and attach its result or error.
    async fn handle(&self, query: QueryDescription) -> QueryDescription;
}

/// Ordered set of repositories plus an optional fallback.
#[derive(Default, Clone)]
pub struct QueryManager {
    default: Option<Arc<dyn Repository>>,
    repositories: Vec<Arc<dyn Repository>>,
}

impl QueryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager with a fallback repository.
    pub fn with_default(default: Arc<dyn Repository>) -> Self {
        Self {
            default: Some(default),
            repositories: Vec::new(),
        }
    }

    /// Append a repository; earlier registrations are consulted first.
    pub fn register(&mut self, repository: Arc<dyn Repository>) -> &mut Self {
        self.repositories.push(repository);
        self
    }

    pub fn set_default(&mut self, default: Arc<dyn Repository>) -> &mut Self {
        self.default = Some(default);
        self
    }

    pub fn default_repository(&self) -> QueryResult<Arc<dyn Repository>> {
        self.default
            .clone()
            .ok_or(QueryError::DefaultRepositoryNotSet)
    }

    /// The repository that handles `entity`: first supporting one, else the default.
    pub fn get(&self, entity: &EntityRef) -> QueryResult<Arc<dyn Repository>> {
        if let Some(repository) = self.repositories.iter().find(|r| r.supports(entity)) {
            return Ok(Arc::clone(repository));
        }

        self.default
            .clone()
            .ok_or_else(|| QueryError::RepositoryNotFound {
                entity: entity.type_name(),
            })
    }

    /// Route a query to its repository and return the resolved description.
    pub async fn dispatch(&self, query: QueryDescription) -> QueryResult<QueryDescription> {
        let repository = self.get(query.entity())?;
        debug!(entity = query.entity().type_name(), "dispatching query");
        Ok(repository.handle(query).await)
    }
}

impl std::fmt::Debug for QueryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryManager")
            .field("has_default", &self.default.is_some())
            .field("repositories", &self.repositories.len())
            .finish()
    }
}
