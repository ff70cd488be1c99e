//! Symbol entity.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::exchange::Exchange;
use crate::query::{Entity, EntitySchema, FieldDef, PrefixSearch, QueryBuilder, SortDirection};

/// Fields the `like` operator may be applied to.
///
/// # Panics
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static SEARCHABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^(name|ticker)$").expect("valid regex literal"));

/// A listed instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub ticker: String,

    #[serde(rename(serialize = "name"))]
    pub company_name: String,

    /// Code of the listing exchange.
    pub exchange_code: String,

    /// ISO 4217 currency code.
    pub currency: String,

    /// Import bookkeeping; never exposed.
    #[serde(default, skip_serializing)]
    pub import_batch: Option<i64>,

    /// Listing exchange, present when embedded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<Exchange>,
}

impl Entity for Symbol {
    fn schema() -> EntitySchema {
        EntitySchema::new("symbol")
            .field(FieldDef::new("ticker").external("ticker"))
            .field(FieldDef::new("company_name").external("name"))
            .field(FieldDef::new("exchange_code").external("exchange_code"))
            .field(FieldDef::new("currency").external("currency"))
            .field(FieldDef::new("import_batch"))
            .belongs_to::<Exchange>("exchange", "exchange_code", "code")
    }
}

impl Symbol {
    /// Builder for `GET /symbols` and `GET /exchanges/{exchange_code}/symbols`.
    pub fn list_query() -> QueryBuilder {
        let mut builder = QueryBuilder::for_model::<Vec<Symbol>>();
        Self::configure(&mut builder);
        builder.add_default_sort("ticker", SortDirection::Asc);
        builder
    }

    /// Builder for `GET /symbols/{ticker}`.
    pub fn lookup_query() -> QueryBuilder {
        let mut builder = QueryBuilder::for_model::<Symbol>();
        Self::configure(&mut builder);
        builder
    }

    fn configure(builder: &mut QueryBuilder) {
        builder
            .register_operator("like", "LIKE", PrefixSearch, SEARCHABLE.clone())
            .set_parse_embedding(true)
            .allow_embed("exchange", "exchange");
    }
}
