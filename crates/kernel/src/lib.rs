//! Sieve kernel library.
//!
//! Translates HTTP query parameters into validated, typed query descriptions
//! and executes them against PostgreSQL. The `sieve` binary serves a
//! stock-data API on top of it.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod query;
pub mod render;
pub mod routes;
pub mod state;
