//! Statement execution seam
//!
//! The repository talks to this trait, never to a driver. Implementations
//! obtain a connection from their provider per call, issue the statement
//! once, and normalize any backend failure into [`Error::Backend`] with the
//! driver's message text. No retry policy.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

/// A result row as a plain field → value object.
pub type Row = Map<String, Value>;

/// Outcome of a non-query statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub last_insert_id: u64,
    pub rows_affected: u64,
}

/// Executes finished statements against a relational backend.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a row-returning statement.
    async fn fetch(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>>;

    /// Run a mutating statement.
    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult>;
}
