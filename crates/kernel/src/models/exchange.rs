//! Exchange entity.

use serde::{Deserialize, Serialize};

use super::symbol::Symbol;
use crate::query::{Entity, EntitySchema, FieldDef, QueryBuilder, SortDirection};

/// A trading venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// Market identifier code (e.g., "XNAS").
    pub code: String,

    pub name: String,

    /// ISO 3166 country code.
    pub country: String,

    /// Listed symbols, present when embedded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<Symbol>>,
}

impl Entity for Exchange {
    fn schema() -> EntitySchema {
        EntitySchema::new("exchange")
            .field(FieldDef::new("code").external("code"))
            .field(FieldDef::new("name").external("name"))
            .field(FieldDef::new("country").external("country"))
            .has_many::<Symbol>("symbols", "code", "exchange_code")
    }
}

impl Exchange {
    /// Builder for `GET /exchanges`.
    pub fn list_query() -> QueryBuilder {
        let mut builder = QueryBuilder::for_model::<Vec<Exchange>>();
        Self::configure(&mut builder);
        builder.add_default_sort("code", SortDirection::Asc);
        builder
    }

    /// Builder for `GET /exchanges/{code}`.
    pub fn lookup_query() -> QueryBuilder {
        let mut builder = QueryBuilder::for_model::<Exchange>();
        Self::configure(&mut builder);
        builder
    }

    fn configure(builder: &mut QueryBuilder) {
        builder
            .set_parse_embedding(true)
            .allow_embed("symbols", "symbols");
    }
}
