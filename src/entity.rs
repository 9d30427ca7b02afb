//! Property-bag entity
//!
//! An entity holds its current values, an optional snapshot of the
//! last-known-persisted values used to compute the changed-field diff, an
//! opaque context value threaded through for request-scoped concerns, and
//! optional preloaded relationship values the link engine consults before
//! querying.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::schema::EntitySchema;
use crate::value::{is_truthy, set_path};

/// One in-memory entity instance backed by a schema descriptor.
///
/// Lifecycle: *transient* when constructed without prior persisted state,
/// *tracked* once `original` is set (after a read, or explicitly before an
/// update), *persisted* after a successful insert/update.
#[derive(Debug, Clone)]
pub struct Entity {
    schema: Arc<EntitySchema>,
    properties: Map<String, Value>,
    original: Option<Box<Entity>>,
    context: Option<Value>,
    relationships: HashMap<String, Vec<Value>>,
}

impl Entity {
    /// Construct an entity from a plain object. Keys (optionally dotted)
    /// whose first segment is not a declared field are silently discarded;
    /// dotted keys nest values inside the first segment's object.
    pub fn new(schema: Arc<EntitySchema>, input: Map<String, Value>) -> Self {
        let mut entity = Self::empty(schema);
        for (key, value) in input {
            entity.set(&key, value);
        }
        entity
    }

    /// Construct an entity with no properties set.
    pub fn empty(schema: Arc<EntitySchema>) -> Self {
        Self {
            schema,
            properties: Map::new(),
            original: None,
            context: None,
            relationships: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Set a field value. Dotted keys address nested structure inside the
    /// first segment; keys outside the declared field set are ignored.
    pub fn set(&mut self, key: &str, value: Value) {
        let field = key.split('.').next().unwrap_or(key);
        if self.schema.has_field(field) {
            set_path(&mut self.properties, key, value);
        }
    }

    /// Current value of a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    /// The identity value, when set.
    pub fn id(&self) -> Option<&Value> {
        self.properties.get("id")
    }

    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }

    pub fn set_context(&mut self, context: Value) {
        self.context = Some(context);
    }

    pub fn original(&self) -> Option<&Entity> {
        self.original.as_deref()
    }

    /// Install a snapshot to diff against. A snapshot carrying a different
    /// schema is silently ignored.
    pub fn set_original(&mut self, snapshot: Entity) {
        if Arc::ptr_eq(&self.schema, &snapshot.schema) {
            self.original = Some(Box::new(snapshot));
        }
    }

    /// Snapshot the current state as the diff baseline (done after a read).
    pub(crate) fn snapshot_original(&mut self) {
        let snapshot = Entity {
            schema: Arc::clone(&self.schema),
            properties: self.properties.clone(),
            original: None,
            context: self.context.clone(),
            relationships: HashMap::new(),
        };
        self.original = Some(Box::new(snapshot));
    }

    /// Changed-field diff against the original snapshot.
    ///
    /// Only fields whose current value is truthy and differs from the
    /// snapshot are emitted; falsy current values (empty string, zero,
    /// false, null) never appear, so an update cannot write a field back to
    /// a falsy value. Inherited policy, preserved as-is.
    pub fn changes(&self) -> Map<String, Value> {
        let mut changes = Map::new();
        for field in &self.schema.fields {
            if let Some(current) = self.properties.get(field) {
                let previous = self.original.as_ref().and_then(|o| o.get(field));
                if is_truthy(current) && previous != Some(current) {
                    changes.insert(field.clone(), current.clone());
                }
            }
        }
        changes
    }

    /// Preloaded values for a relation key, when the caller supplied them.
    pub fn relationship(&self, key: &str) -> Option<&Vec<Value>> {
        self.relationships.get(key)
    }

    pub fn set_relationship(&mut self, key: impl Into<String>, values: Vec<Value>) {
        self.relationships.insert(key.into(), values);
    }
}
