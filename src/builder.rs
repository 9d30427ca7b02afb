//! SELECT projection, ordering, pagination and assignment-list builders
//!
//! These helpers produce the clause fragments the repository composes into
//! full statements. Identifiers are backtick-escaped; dotted field names
//! are rewritten through the same JSON extraction as the condition
//! compiler and aliased back to their dotted form in projections.

use serde_json::Value;

use crate::condition::{build_where, Condition};
use crate::config::DEFAULT_PAGE_SIZE;
use crate::value::{escape_id, fix_field_name};

/// Projection specification for a SELECT.
#[derive(Debug, Clone, Default)]
pub enum FieldSpec {
    /// All columns (`*`)
    #[default]
    All,
    /// A single field, optionally containing an ` as ` alias
    One(String),
    /// A field list
    Many(Vec<String>),
}

impl From<&str> for FieldSpec {
    fn from(field: &str) -> Self {
        FieldSpec::One(field.to_string())
    }
}

impl From<Vec<String>> for FieldSpec {
    fn from(fields: Vec<String>) -> Self {
        FieldSpec::Many(fields)
    }
}

/// Ordering specification for a SELECT.
#[derive(Debug, Clone)]
pub enum OrderBy {
    /// Field list; a leading `-` selects descending order
    Columns(Vec<String>),
    /// Field → direction pairs; the direction text is emitted verbatim,
    /// an empty direction emits the bare field
    Directed(Vec<(String, String)>),
    /// A single bare field, no direction
    Column(String),
}

impl Default for OrderBy {
    fn default() -> Self {
        OrderBy::Columns(Vec::new())
    }
}

/// An assignment value for INSERT/UPDATE statements.
#[derive(Debug, Clone)]
pub enum AssignValue {
    /// Parameterized as `field = ?`
    Value(Value),
    /// Inlined verbatim as `field = <fragment>`, never parameterized
    Raw(String),
}

impl From<Value> for AssignValue {
    fn from(value: Value) -> Self {
        AssignValue::Value(value)
    }
}

/// Parallel assignment-expression and argument lists produced by
/// [`filter_values`].
#[derive(Debug, Clone, PartialEq)]
pub struct Assignments {
    pub keys: Vec<String>,
    pub values: Vec<Value>,
}

/// A finished statement: SQL text plus its ordered argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

fn column_rename(col: &str) -> String {
    if let Some((name, alias)) = col.split_once(" as ") {
        format!("{} as {}", escape_id(name), escape_id(alias))
    } else {
        fix_field_name(col)
    }
}

/// Build the projection list. Empty input and `*` both project everything.
pub fn select_fields(spec: &FieldSpec) -> String {
    match spec {
        FieldSpec::All => "*".to_string(),
        FieldSpec::One(field) if field.is_empty() || field == "*" => "*".to_string(),
        FieldSpec::One(field) => column_rename(field),
        FieldSpec::Many(fields) if fields.is_empty() => "*".to_string(),
        FieldSpec::Many(fields) => {
            let list: Vec<String> = fields.iter().map(|f| column_rename(f)).collect();
            list.join(", ")
        }
    }
}

/// Build the ORDER BY clause; empty input yields an empty string.
pub fn order_by_fields(order: &OrderBy) -> String {
    let rendered = match order {
        OrderBy::Columns(fields) => {
            let list: Vec<String> = fields
                .iter()
                .map(|field| match field.strip_prefix('-') {
                    Some(name) => format!("{} DESC", escape_id(name)),
                    None => format!("{} ASC", escape_id(field)),
                })
                .collect();
            list.join(", ")
        }
        OrderBy::Directed(pairs) => {
            let list: Vec<String> = pairs
                .iter()
                .map(|(field, direction)| {
                    if direction.is_empty() {
                        escape_id(field)
                    } else {
                        format!("{} {}", escape_id(field), direction)
                    }
                })
                .collect();
            list.join(", ")
        }
        OrderBy::Column(field) => escape_id(field),
    };

    if rendered.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", rendered)
    }
}

/// Build the LIMIT clause. No offset yields no clause; an offset without a
/// limit falls back to the default page size.
pub fn limit_clause(offset: Option<u64>, limit: Option<u64>) -> String {
    match offset {
        None => String::new(),
        Some(from) => {
            let count = limit.unwrap_or(DEFAULT_PAGE_SIZE);
            format!(" LIMIT {}, {}", from, count)
        }
    }
}

/// Restrict a value list to the declared field set, producing parallel
/// assignment and argument lists. Raw entries inline their fragment and
/// contribute no argument.
pub fn filter_values(fields: &[String], values: &[(String, AssignValue)]) -> Assignments {
    let mut result = Assignments {
        keys: Vec::new(),
        values: Vec::new(),
    };
    for (key, value) in values {
        if !fields.iter().any(|f| f == key) {
            continue;
        }
        match value {
            AssignValue::Raw(fragment) => {
                result.keys.push(format!("{} = {}", escape_id(key), fragment));
            }
            AssignValue::Value(value) => {
                result.keys.push(format!("{} = ?", escape_id(key)));
                result.values.push(value.clone());
            }
        }
    }
    result
}

/// Compose a full SELECT statement for a pre-escaped table expression.
pub fn select_statement(
    table: &str,
    condition: &[Condition],
    fields: &FieldSpec,
    order: &OrderBy,
    offset: Option<u64>,
    limit: Option<u64>,
) -> Statement {
    let built = build_where(condition);
    let select = select_fields(fields);
    let order = order_by_fields(order);
    let limit = limit_clause(offset, limit);

    Statement {
        sql: format!("SELECT {} FROM {}{}{}{}", select, table, built.clause, order, limit),
        args: built.args,
    }
}
