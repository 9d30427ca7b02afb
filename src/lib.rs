//! rowlink - MySQL entity mapper with declarative relationship resolution
//!
//! Maps property-bag entities, each backed by an immutable schema
//! descriptor, onto rows of a MySQL backend through parameterized textual
//! queries, and resolves declared relationships (many-to-many via join
//! table, one-to-many via foreign key, one-to-one via inline foreign key)
//! into a nested `links` wire representation and back.
//!
//! The pieces compose leaf-first: the condition compiler and clause
//! builders produce statement text plus an ordered argument list, the
//! repository validates and executes statements through the [`Executor`]
//! seam, and the link engine fans out relation sub-queries concurrently
//! with partial-failure tolerance.
//!
//! ```rust,ignore
//! let schema = Arc::new(
//!     EntitySchema::new("users", &["id", "name", "organisation_id"])
//!         .with_plural("users")
//!         .with_link(Relation::one_to_one("organisations", "organisation_id")),
//! );
//!
//! let repository = Repository::new(executor);
//! let users = repository
//!     .find(&schema)
//!     .filter([Condition::new("name", json!("ashish"))])
//!     .fetch_all()
//!     .await?;
//! ```

pub mod builder;
pub mod condition;
pub mod config;
pub mod entity;
pub mod error;
pub mod executor;
pub mod link;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod repository;
pub mod schema;
pub mod serialize;
mod value;

pub use builder::{
    filter_values, limit_clause, order_by_fields, select_fields, select_statement, AssignValue,
    Assignments, FieldSpec, OrderBy, Statement,
};
pub use condition::{
    build_where, Condition, ConditionValue, Connective, Subquery, SubqueryTable, WhereClause,
};
pub use config::{Config, DEFAULT_PAGE_SIZE};
pub use entity::Entity;
pub use error::{Error, Result};
pub use executor::{ExecResult, Executor, Row};
pub use link::LinkEngine;
#[cfg(feature = "mysql")]
pub use mysql::{MySqlExecutor, MySqlProvider};
pub use repository::{FindQuery, Repository};
pub use schema::{Codec, EntitySchema, Registry, Relation, RelationKind};
