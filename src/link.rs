//! Relationship resolution engine
//!
//! Resolves the declared relationship topologies into and out of the
//! nested wire representation: foreign-key scalars and join-table rows
//! become relation values under a `links` sub-object. All resolutions for
//! one call run concurrently; each produces an explicit per-relation
//! result, and the join step drops failures so a broken relation is
//! omitted rather than failing the whole call.

use futures::future::join_all;
use serde_json::{Map, Value};

use crate::builder::FieldSpec;
use crate::condition::Condition;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::repository::Repository;
use crate::schema::{EntitySchema, Registry, Relation, RelationKind};

use std::sync::Arc;

/// Outcome of one relation's resolution.
struct ResolvedRelation {
    plural: String,
    value: Value,
    /// Foreign-key field to strip from the wire object (one-to-one only)
    strip_field: Option<String>,
}

/// Resolves relationships against a repository and a type registry.
pub struct LinkEngine<'a> {
    repository: &'a Repository,
    registry: &'a Registry,
}

impl<'a> LinkEngine<'a> {
    pub fn new(repository: &'a Repository, registry: &'a Registry) -> Self {
        Self {
            repository,
            registry,
        }
    }

    /// Produce the wire representation of an entity.
    ///
    /// Relations are filtered to `selected` plural names when given;
    /// without a filter only one-to-one relations are processed. Failed
    /// resolutions are dropped from the output instead of propagating.
    pub async fn to_link(&self, entity: &Entity, selected: Option<&[&str]>) -> Map<String, Value> {
        let mut object = entity.properties().clone();

        let relations: Vec<&Relation> = entity
            .schema()
            .links
            .iter()
            .filter(|link| match selected {
                Some(plurals) => plurals.contains(&link.plural.as_str()),
                None => link.kind == RelationKind::OneToOne,
            })
            .collect();

        let resolutions =
            join_all(relations.iter().map(|&link| self.resolve(entity, link))).await;

        let mut links = Map::new();
        for resolution in resolutions {
            match resolution {
                Ok(Some(resolved)) => {
                    if let Some(field) = resolved.strip_field {
                        object.remove(&field);
                    }
                    links.insert(resolved.plural, resolved.value);
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::debug!(%error, "dropping unresolved relation");
                }
            }
        }

        object.insert("links".to_string(), Value::Object(links));
        object
    }

    /// Rebuild an entity from a wire representation.
    ///
    /// Only one-to-one relations rehydrate: `links[plural]`, when present,
    /// is copied back into the foreign-key field before construction. Other
    /// relation kinds pass through unchanged; only a single foreign-key
    /// scalar can be written back without a separate join-table write.
    pub fn from_link(
        &self,
        schema: Arc<EntitySchema>,
        context: Option<Value>,
        mut object: Map<String, Value>,
    ) -> Entity {
        for link in &schema.links {
            if link.kind != RelationKind::OneToOne {
                continue;
            }
            let value = object
                .get("links")
                .and_then(|links| links.get(&link.plural))
                .cloned();
            if let Some(value) = value {
                object.insert(link.foreign_key.clone(), value);
            }
        }

        let mut entity = Entity::new(schema, object);
        if let Some(context) = context {
            entity.set_context(context);
        }
        entity
    }

    async fn resolve(&self, entity: &Entity, link: &Relation) -> Result<Option<ResolvedRelation>> {
        match link.kind {
            RelationKind::ManyToMany => self.resolve_many_to_many(entity, link).await.map(Some),
            RelationKind::OneToMany => self.resolve_one_to_many(entity, link).await.map(Some),
            RelationKind::OneToOne => Ok(resolve_one_to_one(entity, link)),
        }
    }

    /// Join-table lookup, short-circuited by a preloaded relationship.
    async fn resolve_many_to_many(
        &self,
        entity: &Entity,
        link: &Relation,
    ) -> Result<ResolvedRelation> {
        let join_table = link
            .join_table
            .as_deref()
            .ok_or(Error::Contract("join_table"))?;
        let child_key = link.child_key.as_deref().ok_or(Error::Contract("child_key"))?;

        if let Some(preloaded) = entity.relationship(join_table) {
            return Ok(ResolvedRelation {
                plural: link.plural.clone(),
                value: Value::Array(preloaded.clone()),
                strip_field: None,
            });
        }

        let identity = entity.id().cloned().unwrap_or(Value::Null);
        let rows = self
            .repository
            .find_links(
                join_table,
                &[Condition::new(child_key, identity)],
                &FieldSpec::One(link.foreign_key.clone()),
            )
            .await?;

        let values: Vec<Value> = rows
            .into_iter()
            .map(|row| row.get(&link.foreign_key).cloned().unwrap_or(Value::Null))
            .collect();

        Ok(ResolvedRelation {
            plural: link.plural.clone(),
            value: Value::Array(values),
            strip_field: None,
        })
    }

    /// Child-table select through the registry, short-circuited by a
    /// preloaded relationship keyed on the child's table name.
    async fn resolve_one_to_many(
        &self,
        entity: &Entity,
        link: &Relation,
    ) -> Result<ResolvedRelation> {
        let child = self
            .registry
            .get(&link.plural)
            .ok_or(Error::Contract("registry"))?;

        if let Some(preloaded) = entity.relationship(&child.table) {
            return Ok(ResolvedRelation {
                plural: link.plural.clone(),
                value: Value::Array(preloaded.clone()),
                strip_field: None,
            });
        }

        let identity = entity.id().cloned().unwrap_or(Value::Null);
        let mut query = self
            .repository
            .find(&child)
            .filter([Condition::new(&link.foreign_key, identity)])
            .fields("id");
        if let Some(context) = entity.context() {
            query = query.context(context.clone());
        }
        let children = query.fetch_all().await?;

        let values: Vec<Value> = children
            .iter()
            .map(|child| child.id().cloned().unwrap_or(Value::Null))
            .collect();

        Ok(ResolvedRelation {
            plural: link.plural.clone(),
            value: Value::Array(values),
            strip_field: None,
        })
    }
}

/// Move the foreign-key value under `links`, coercing numeric strings to
/// integers. No-op (and no `links` entry) when the field is absent or
/// falsy.
fn resolve_one_to_one(entity: &Entity, link: &Relation) -> Option<ResolvedRelation> {
    let value = entity.get(&link.foreign_key)?;
    if !crate::value::is_truthy(value) {
        return None;
    }
    Some(ResolvedRelation {
        plural: link.plural.clone(),
        value: coerce_identifier(value.clone()),
        strip_field: Some(link.foreign_key.clone()),
    })
}

/// Numeric strings become integers (foreign keys are integer columns in
/// the modeled backend); anything else is left untouched.
fn coerce_identifier(value: Value) -> Value {
    match value {
        Value::String(text) => match text.parse::<i64>() {
            Ok(number) => Value::from(number),
            Err(_) => Value::String(text),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn coerces_numeric_strings_only() {
        assert_eq!(coerce_identifier(json!("3")), json!(3));
        assert_eq!(coerce_identifier(json!("abc-123")), json!("abc-123"));
        assert_eq!(coerce_identifier(json!(7)), json!(7));
    }
}
