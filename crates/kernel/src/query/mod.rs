//! Query translation engine.
//!
//! This module provides:
//! - QueryBuilder: parses request parameters into validated query descriptions
//! - OperatorRegistry: filter operator tokens, symbols, and value transforms
//! - Entity / Model: schema descriptors and result shapes
//! - QueryHandler: renders descriptions with SeaQuery and runs them on a Store
//! - QueryManager: routes descriptions to the repository for their entity

pub mod builder;
pub mod handler;
pub mod manager;
pub mod operator;
pub mod params;
pub mod schema;
pub mod store;
pub mod types;

pub use builder::{DEFAULT_LIMIT, DEFAULT_OFFSET, MAX_LIMIT, QueryBuilder};
pub use handler::QueryHandler;
pub use manager::{QueryManager, Repository};
pub use operator::{Identity, OperatorRegistry, PrefixSearch, ValueTransform};
pub use params::{ParameterSource, Parameters};
pub use schema::{Cardinality, Entity, EntityRef, EntitySchema, FieldDef, Model};
pub use store::{PgStore, Store, StoreRequest, StoreResponse};
pub use types::{
    Filter, FilterValue, Preload, QueryDescription, QuerySpec, Sort, SortDirection, Window,
};
