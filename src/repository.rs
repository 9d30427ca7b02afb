//! CRUD operations over the executor seam
//!
//! The repository composes the clause builders into full statements,
//! validates entity state before touching the backend, and reconstitutes
//! result rows into entities (decoded, with their diff baseline
//! snapshotted).

use std::sync::Arc;

use serde_json::Value;

use crate::builder::{
    filter_values, select_statement, AssignValue, FieldSpec, OrderBy,
};
use crate::condition::{build_where, Condition};
use crate::config::DEFAULT_PAGE_SIZE;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::executor::{Executor, Row};
use crate::schema::EntitySchema;
use crate::serialize;
use crate::value::is_truthy;

/// Entity persistence over an [`Executor`].
pub struct Repository {
    executor: Arc<dyn Executor>,
    page_size: u64,
}

impl Repository {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the page size applied when a select gives an offset but no
    /// limit.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Start a select against an entity type.
    pub fn find(&self, schema: &Arc<EntitySchema>) -> FindQuery<'_> {
        FindQuery {
            repository: self,
            schema: Arc::clone(schema),
            filter: Vec::new(),
            fields: FieldSpec::All,
            order: OrderBy::default(),
            offset: None,
            limit: None,
            context: None,
        }
    }

    /// Insert an entity, returning the backend's last-insert id.
    ///
    /// Rejects an entity with no properties; runs the encode pass first.
    pub async fn insert(&self, entity: &mut Entity) -> Result<u64> {
        if entity.properties().is_empty() {
            return Err(Error::EmptyValues);
        }
        serialize::encode(entity);

        let table = entity.schema().qualified_table()?;
        let values: Vec<(String, AssignValue)> = entity
            .properties()
            .iter()
            .map(|(k, v)| (k.clone(), AssignValue::Value(v.clone())))
            .collect();
        let assignments = filter_values(&entity.schema().fields, &values);

        let sql = format!("INSERT INTO {} SET {}", table, assignments.keys.join(", "));
        let result = self.executor.execute(&sql, &assignments.values).await?;
        Ok(result.last_insert_id)
    }

    /// Update an entity from its changed-field diff.
    ///
    /// Requires a tracked original with a usable identity; rejects an empty
    /// diff before issuing any backend call. Returns whether rows changed.
    pub async fn update(&self, entity: &mut Entity) -> Result<bool> {
        let identity = entity
            .original()
            .and_then(|original| original.get("id"))
            .cloned();
        let identity = match identity {
            Some(value) if is_truthy(&value) => value,
            _ => return Err(Error::MissingIdentity),
        };

        serialize::encode(entity);
        let changes = entity.changes();
        if changes.is_empty() {
            return Err(Error::NoChanges);
        }

        let condition = build_where(&[Condition::new("id", identity)]);
        let values: Vec<(String, AssignValue)> = changes
            .into_iter()
            .map(|(k, v)| (k, AssignValue::Value(v)))
            .collect();
        let assignments = filter_values(&entity.schema().fields, &values);

        let table = entity.schema().qualified_table()?;
        let sql = format!(
            "UPDATE {} SET {}{}",
            table,
            assignments.keys.join(", "),
            condition.clause
        );
        let mut args = assignments.values;
        args.extend(condition.args);

        let result = self.executor.execute(&sql, &args).await?;
        Ok(result.rows_affected > 0)
    }

    /// Delete the row matching the entity's identity. Returns whether rows
    /// were removed.
    pub async fn delete(&self, entity: &Entity) -> Result<bool> {
        let identity = match entity.get("id") {
            Some(value) if is_truthy(value) => value.clone(),
            _ => return Err(Error::MissingIdentity),
        };

        let condition = build_where(&[Condition::new("id", identity)]);
        let table = entity.schema().qualified_table()?;
        let sql = format!("DELETE FROM {}{}", table, condition.clause);

        let result = self.executor.execute(&sql, &condition.args).await?;
        Ok(result.rows_affected > 0)
    }

    /// Raw projection against an arbitrary table name (used for join-table
    /// lookups). The table name is NOT identifier-escaped.
    pub async fn find_links(
        &self,
        table: &str,
        condition: &[Condition],
        fields: &FieldSpec,
    ) -> Result<Vec<Row>> {
        let built = build_where(condition);
        let columns = crate::builder::select_fields(fields);
        let sql = format!("SELECT {} FROM {}{}", columns, table, built.clause);
        self.executor.fetch(&sql, &built.args).await
    }
}

/// Fluent select builder for one entity type.
pub struct FindQuery<'a> {
    repository: &'a Repository,
    schema: Arc<EntitySchema>,
    filter: Vec<Condition>,
    fields: FieldSpec,
    order: OrderBy,
    offset: Option<u64>,
    limit: Option<u64>,
    context: Option<Value>,
}

impl<'a> FindQuery<'a> {
    /// Set the filter conditions.
    pub fn filter(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.filter = conditions.into_iter().collect();
        self
    }

    /// Set the projection.
    pub fn fields(mut self, fields: impl Into<FieldSpec>) -> Self {
        self.fields = fields.into();
        self
    }

    /// Set the ordering.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order = order;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set offset and limit together.
    pub fn paginate(mut self, offset: u64, limit: u64) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    /// Thread a request-scoped context onto the returned entities.
    pub fn context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Execute and return all matching entities, decoded and tracked.
    pub async fn fetch_all(self) -> Result<Vec<Entity>> {
        let table = self.schema.qualified_table()?;
        let limit = match (self.offset, self.limit) {
            (Some(_), None) => Some(self.repository.page_size),
            _ => self.limit,
        };
        let statement = select_statement(&table, &self.filter, &self.fields, &self.order, self.offset, limit);

        let rows = self
            .repository
            .executor
            .fetch(&statement.sql, &statement.args)
            .await?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            let mut entity = Entity::new(Arc::clone(&self.schema), row);
            if let Some(context) = &self.context {
                entity.set_context(context.clone());
            }
            serialize::decode(&mut entity);
            entity.snapshot_original();
            entities.push(entity);
        }
        Ok(entities)
    }

    /// Execute and return the first matching entity, if any.
    pub async fn fetch_optional(self) -> Result<Option<Entity>> {
        let mut entities = self.limit(1).fetch_all().await?;
        Ok(if entities.is_empty() {
            None
        } else {
            Some(entities.remove(0))
        })
    }
}
