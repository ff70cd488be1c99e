//! Entity schema descriptors.
//!
//! Entities describe themselves through [`Entity::schema`]: the table they
//! live in, their fields, and the relations that may be preloaded. Only
//! fields that declare an external name can be filtered or sorted on.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;

/// A queryable record type.
pub trait Entity: DeserializeOwned + Send + Sync + 'static {
    /// Describe the entity. Must return the same schema on every call.
    fn schema() -> EntitySchema;
}

/// The shape a query result takes.
///
/// Plain entities yield at most one row, `Vec<E>` yields a collection, and
/// `Arc<M>` unwraps to whatever `M` yields.
pub trait Model: 'static {
    type Entity: Entity;
    type Output;
    const COLLECTION: bool;
}

impl<E: Entity> Model for E {
    type Entity = E;
    type Output = Option<E>;
    const COLLECTION: bool = false;
}

impl<E: Entity> Model for Vec<E> {
    type Entity = E;
    type Output = Vec<E>;
    const COLLECTION: bool = true;
}

impl<M: Model> Model for Arc<M> {
    type Entity = M::Entity;
    type Output = M::Output;
    const COLLECTION: bool = M::COLLECTION;
}

/// Field declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Internal (Rust) field name.
    pub name: &'static str,
    /// Serialized name clients use; `None` keeps the field private.
    pub external: Option<&'static str>,
    /// Storage column, defaults to the internal name.
    pub column: &'static str,
}

impl FieldDef {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            external: None,
            column: name,
        }
    }

    pub fn external(mut self, external: &'static str) -> Self {
        self.external = Some(external);
        self
    }

    pub fn column(mut self, column: &'static str) -> Self {
        self.column = column;
        self
    }
}

/// How many related rows a relation yields per parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Relation declaration.
#[derive(Debug, Clone)]
pub struct RelationDef {
    /// Relation name; also the key the related rows are embedded under.
    pub name: &'static str,
    /// Schema of the related entity.
    pub target: fn() -> EntitySchema,
    /// Column on this entity's table holding the join key.
    pub local_column: &'static str,
    /// Column on the related table matched against the join key.
    pub foreign_column: &'static str,
    pub cardinality: Cardinality,
}

impl RelationDef {
    pub fn target(&self) -> EntitySchema {
        (self.target)()
    }
}

impl PartialEq for RelationDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.local_column == other.local_column
            && self.foreign_column == other.foreign_column
            && self.cardinality == other.cardinality
            && self.target().table == other.target().table
    }
}

impl Eq for RelationDef {}

/// Complete description of an entity's storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    pub table: &'static str,
    pub fields: Vec<FieldDef>,
    pub relations: Vec<RelationDef>,
}

impl EntitySchema {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare a to-one relation on entity `E`.
    pub fn belongs_to<E: Entity>(
        self,
        name: &'static str,
        local_column: &'static str,
        foreign_column: &'static str,
    ) -> Self {
        self.relate(
            name,
            E::schema,
            local_column,
            foreign_column,
            Cardinality::One,
        )
    }

    /// Declare a to-many relation on entity `E`.
    pub fn has_many<E: Entity>(
        self,
        name: &'static str,
        local_column: &'static str,
        foreign_column: &'static str,
    ) -> Self {
        self.relate(
            name,
            E::schema,
            local_column,
            foreign_column,
            Cardinality::Many,
        )
    }

    fn relate(
        mut self,
        name: &'static str,
        target: fn() -> EntitySchema,
        local_column: &'static str,
        foreign_column: &'static str,
        cardinality: Cardinality,
    ) -> Self {
        self.relations.push(RelationDef {
            name,
            target,
            local_column,
            foreign_column,
            cardinality,
        });
        self
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// The field stored in `column`.
    pub fn field_for_column(&self, column: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.column == column)
    }
}

/// Type-erased reference to a model.
#[derive(Clone, Copy)]
pub struct EntityRef {
    type_id: TypeId,
    type_name: &'static str,
    schema: fn() -> EntitySchema,
    collection: bool,
}

impl EntityRef {
    /// Reference the entity behind model `M`.
    pub fn of<M: Model>() -> Self {
        Self {
            type_id: TypeId::of::<M::Entity>(),
            type_name: std::any::type_name::<M::Entity>(),
            schema: <M::Entity as Entity>::schema,
            collection: M::COLLECTION,
        }
    }

    /// Whether this references entity `E`, in any shape.
    pub fn is<E: Entity>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    /// Whether both reference the same entity, regardless of shape.
    pub fn same_entity(&self, other: &EntityRef) -> bool {
        self.type_id == other.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_collection(&self) -> bool {
        self.collection
    }

    /// Recompute the entity schema.
    pub fn schema(&self) -> EntitySchema {
        (self.schema)()
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.collection == other.collection
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("type_name", &self.type_name)
            .field("collection", &self.collection)
            .finish()
    }
}

/// External name → internal name for every field clients may address.
pub fn queryable_fields(entity: &EntityRef) -> BTreeMap<String, String> {
    entity
        .schema()
        .fields
        .iter()
        .filter_map(|f| f.external.map(|ext| (ext.to_string(), f.name.to_string())))
        .collect()
}

/// Internal name → storage column for every field.
pub fn column_map(schema: &EntitySchema) -> BTreeMap<&'static str, &'static str> {
    schema.fields.iter().map(|f| (f.name, f.column)).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Quote {
        #[allow(dead_code)]
        price: i64,
    }

    impl Entity for Quote {
        fn schema() -> EntitySchema {
            EntitySchema::new("quote")
                .field(FieldDef::new("symbol_id").external("symbol").column("sym"))
                .field(FieldDef::new("price").external("price"))
                .field(FieldDef::new("source_batch"))
                .belongs_to::<Listed>("symbol", "sym", "ticker")
        }
    }

    #[derive(Debug, Deserialize)]
    struct Listed {}

    impl Entity for Listed {
        fn schema() -> EntitySchema {
            EntitySchema::new("symbol")
                .field(FieldDef::new("ticker").external("ticker"))
                .has_many::<Quote>("quotes", "ticker", "sym")
        }
    }

    #[test]
    fn only_external_fields_are_queryable() {
        let fields = queryable_fields(&EntityRef::of::<Quote>());

        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("symbol").map(String::as_str), Some("symbol_id"));
        assert_eq!(fields.get("price").map(String::as_str), Some("price"));
        assert!(!fields.contains_key("source_batch"));
        assert!(!fields.values().any(|v| v == "source_batch"));
    }

    #[test]
    fn every_shape_unwraps_to_the_same_fields() {
        let plain = queryable_fields(&EntityRef::of::<Quote>());
        let pointer = queryable_fields(&EntityRef::of::<Arc<Quote>>());
        let collection = queryable_fields(&EntityRef::of::<Vec<Quote>>());
        let pointer_to_collection = queryable_fields(&EntityRef::of::<Arc<Vec<Quote>>>());

        assert_eq!(plain, pointer);
        assert_eq!(plain, collection);
        assert_eq!(plain, pointer_to_collection);
    }

    #[test]
    fn shape_sets_collection_flag() {
        assert!(!EntityRef::of::<Quote>().is_collection());
        assert!(!EntityRef::of::<Arc<Quote>>().is_collection());
        assert!(EntityRef::of::<Vec<Quote>>().is_collection());
        assert!(EntityRef::of::<Arc<Vec<Quote>>>().is_collection());
    }

    #[test]
    fn introspection_is_pure() {
        let entity = EntityRef::of::<Quote>();
        assert_eq!(queryable_fields(&entity), queryable_fields(&entity));
        assert_eq!(entity.schema(), entity.schema());
    }

    #[test]
    fn columns_default_to_field_names() {
        let schema = Quote::schema();
        let columns = column_map(&schema);
        assert_eq!(columns.get("symbol_id"), Some(&"sym"));
        assert_eq!(columns.get("price"), Some(&"price"));
        assert_eq!(columns.get("source_batch"), Some(&"source_batch"));
    }

    #[test]
    fn relation_lookup() {
        let schema = Quote::schema();
        let rel = schema.relation("symbol").unwrap();
        assert_eq!(rel.cardinality, Cardinality::One);
        assert_eq!(rel.target().table, "symbol");
        assert_eq!(schema.field_for_column("sym").unwrap().name, "symbol_id");

        let back = Listed::schema();
        let rel = back.relation("quotes").unwrap();
        assert_eq!(rel.cardinality, Cardinality::Many);
        assert_eq!(rel.target().table, "quote");
        assert!(schema.relation("exchange").is_none());
        assert!(EntityRef::of::<Vec<Quote>>().is::<Quote>());
    }
}
