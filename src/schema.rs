//! Entity schema descriptors and the relation registry
//!
//! Schema metadata is an immutable value held behind an `Arc` by every
//! entity instance, never shared mutable state. Related entity types are
//! resolved through an explicit [`Registry`] injected once at startup
//! rather than looked up dynamically by name.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::escape_id;

/// Per-field codec applied on the write and read paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Structured value ⇄ JSON text encoding
    Json,
}

/// The closed set of relationship topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Materialized through a join table correlating two entities
    ManyToMany,
    /// The child entity stores a foreign key referencing this entity
    OneToMany,
    /// This entity stores a foreign key pointing to one related entity
    OneToOne,
}

/// Static relationship descriptor declared on an entity type.
#[derive(Debug, Clone)]
pub struct Relation {
    pub kind: RelationKind,
    /// Key under the wire object's `links` sub-object; also the registry
    /// key of the related type
    pub plural: String,
    /// Foreign-key column: on this entity for one-to-one, on the child for
    /// one-to-many, on the join table for many-to-many
    pub foreign_key: String,
    /// Join table name (many-to-many only)
    pub join_table: Option<String>,
    /// Column on the join table referencing this entity (many-to-many only)
    pub child_key: Option<String>,
    pub can_modify: bool,
}

impl Relation {
    pub fn one_to_one(plural: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::OneToOne,
            plural: plural.into(),
            foreign_key: foreign_key.into(),
            join_table: None,
            child_key: None,
            can_modify: false,
        }
    }

    pub fn one_to_many(plural: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::OneToMany,
            plural: plural.into(),
            foreign_key: foreign_key.into(),
            join_table: None,
            child_key: None,
            can_modify: false,
        }
    }

    pub fn many_to_many(
        plural: impl Into<String>,
        foreign_key: impl Into<String>,
        join_table: impl Into<String>,
        child_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::ManyToMany,
            plural: plural.into(),
            foreign_key: foreign_key.into(),
            join_table: Some(join_table.into()),
            child_key: Some(child_key.into()),
            can_modify: false,
        }
    }

    pub fn modifiable(mut self) -> Self {
        self.can_modify = true;
        self
    }
}

/// Immutable schema descriptor for one entity type.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    /// Optional database name qualifying the table
    pub database: Option<String>,
    pub table: String,
    /// Plural name used as the wire/registry key for this type
    pub plural: String,
    /// The declared field set; `properties` never holds a key outside it
    pub fields: Vec<String>,
    /// Per-field codec table
    pub serialized: BTreeMap<String, Codec>,
    /// Declared relationships
    pub links: Vec<Relation>,
}

impl EntitySchema {
    pub fn new(table: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            database: None,
            table: table.into(),
            plural: String::new(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            serialized: BTreeMap::new(),
            links: Vec::new(),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = plural.into();
        self
    }

    pub fn with_serialized(mut self, field: impl Into<String>, codec: Codec) -> Self {
        self.serialized.insert(field.into(), codec);
        self
    }

    pub fn with_link(mut self, link: Relation) -> Self {
        self.links.push(link);
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    /// Backtick-escaped, database-qualified table name.
    pub fn qualified_table(&self) -> Result<String> {
        if self.table.is_empty() {
            return Err(Error::Contract("table"));
        }
        match &self.database {
            Some(database) if !database.is_empty() => {
                Ok(format!("{}.{}", escape_id(database), escape_id(&self.table)))
            }
            _ => Ok(escape_id(&self.table)),
        }
    }
}

/// Maps relation keys (plural names) to the schema of the related type.
///
/// Built once at startup and handed to the link engine; replaces dynamic
/// module lookup at resolution time.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    types: HashMap<String, Arc<EntitySchema>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: Arc<EntitySchema>) {
        self.types.insert(schema.plural.clone(), schema);
    }

    pub fn get(&self, plural: &str) -> Option<Arc<EntitySchema>> {
        self.types.get(plural).cloned()
    }
}
