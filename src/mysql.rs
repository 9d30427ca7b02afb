//! sqlx-backed MySQL connection provider and executor
//!
//! The provider creates its pool lazily from [`Config`] and hands clones of
//! the handle to each execution; nothing here is shared static state. A
//! pool size of 1 behaves like the single-connection mode of the original
//! deployment.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Number, Value};
use sqlx::mysql::{MySql, MySqlArguments, MySqlColumn, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row as SqlxRow, TypeInfo};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::{ExecResult, Executor, Row};

/// Lazily-opened MySQL pool handle.
#[derive(Debug)]
pub struct MySqlProvider {
    config: Config,
    pool: Mutex<Option<MySqlPool>>,
}

impl MySqlProvider {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            pool: Mutex::new(None),
        }
    }

    /// Open (or reuse) the pool.
    pub async fn open(&self) -> Result<MySqlPool> {
        if let Some(pool) = self.pool.lock().clone() {
            return Ok(pool);
        }
        tracing::debug!(pool_size = self.config.pool_size, "creating connection pool");
        let pool = MySqlPoolOptions::new()
            .max_connections(self.config.pool_size.max(1))
            .connect(&self.config.database_url)
            .await
            .map_err(Error::backend)?;
        *self.pool.lock() = Some(pool.clone());
        Ok(pool)
    }

    /// Close the pool if one was opened. Returns whether anything closed.
    pub async fn close(&self) -> bool {
        let pool = self.pool.lock().take();
        match pool {
            Some(pool) => {
                pool.close().await;
                true
            }
            None => false,
        }
    }
}

/// [`Executor`] implementation over a [`MySqlProvider`].
#[derive(Debug)]
pub struct MySqlExecutor {
    provider: MySqlProvider,
}

impl MySqlExecutor {
    pub fn new(provider: MySqlProvider) -> Self {
        Self { provider }
    }

    pub fn from_config(config: Config) -> Self {
        Self::new(MySqlProvider::new(config))
    }

    pub fn provider(&self) -> &MySqlProvider {
        &self.provider
    }
}

#[async_trait]
impl Executor for MySqlExecutor {
    async fn fetch(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let pool = self.provider.open().await?;
        tracing::debug!(sql = %sql, args = args.len(), "executing query");

        let mut query = sqlx::query(sql);
        for value in args {
            query = bind_value(query, value);
        }
        let rows = query.fetch_all(&pool).await.map_err(Error::backend)?;
        Ok(rows.iter().map(row_to_object).collect())
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let pool = self.provider.open().await?;
        tracing::debug!(sql = %sql, args = args.len(), "executing statement");

        let mut query = sqlx::query(sql);
        for value in args {
            query = bind_value(query, value);
        }
        let result = query.execute(&pool).await.map_err(Error::backend)?;
        Ok(ExecResult {
            last_insert_id: result.last_insert_id(),
            rows_affected: result.rows_affected(),
        })
    }
}

/// Bind one positional argument. Structured values bind as their JSON text
/// encoding; the serializer pass normally stringifies them first.
fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(u)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn row_to_object(row: &MySqlRow) -> Row {
    let mut object = Map::new();
    for column in row.columns() {
        object.insert(column.name().to_string(), decode_column(row, column));
    }
    object
}

/// Decode one column into a JSON value, by declared column type. Unknown
/// types fall back to their textual form.
fn decode_column(row: &MySqlRow, column: &MySqlColumn) -> Value {
    let index = column.ordinal();
    match column.type_info().name() {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row
            .try_get::<Option<u64>, _>(index)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "FLOAT" | "DOUBLE" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "JSON" => row
            .try_get::<Option<Value>, _>(index)
            .ok()
            .flatten()
            .unwrap_or(Value::Null),
        "DATE" => text_value(row.try_get::<Option<chrono::NaiveDate>, _>(index)),
        "TIME" => text_value(row.try_get::<Option<chrono::NaiveTime>, _>(index)),
        "DATETIME" => text_value(row.try_get::<Option<chrono::NaiveDateTime>, _>(index)),
        "TIMESTAMP" => text_value(row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)),
        "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            .unwrap_or(Value::Null),
        _ => row
            .try_get_unchecked::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

fn text_value<T: ToString>(decoded: sqlx::Result<Option<T>>) -> Value {
    decoded
        .ok()
        .flatten()
        .map(|v| Value::String(v.to_string()))
        .unwrap_or(Value::Null)
}
