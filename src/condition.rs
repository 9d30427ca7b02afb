//! Condition model and WHERE-clause compiler
//!
//! A condition tree compiles to parameterized SQL text plus a positional
//! argument list. Raw fragments are an explicit variant of the value model
//! so the parameterization bypass is visible at the type level instead of
//! being inferred from a value's runtime shape.

use std::sync::Arc;

use serde_json::Value;

use crate::builder::{select_statement, FieldSpec, OrderBy};
use crate::schema::EntitySchema;
use crate::value::{escape_id, json_field_notation};

/// The fixed operator set. Anything else silently falls back to `=`.
const OPERATORS: &[&str] = &[
    "=", "<", ">", "<=", ">=", "<>", "!=", "like", "not like", "between", "ilike", "regexp", "in",
    "not in",
];

/// How a node joins onto the clause built so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connective {
    #[default]
    And,
    Or,
}

impl Connective {
    fn as_str(self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
        }
    }
}

/// Target table of a correlated sub-query.
#[derive(Debug, Clone)]
pub enum SubqueryTable {
    /// A raw table name, identifier-escaped when compiled
    Name(String),
    /// A registered entity type; compiles to its qualified table name
    Schema(Arc<EntitySchema>),
}

/// A correlated sub-query used as an `IN`/`NOT IN` value. Its text is
/// inlined in parentheses and its argument list spliced into the outer
/// statement at the matching position.
#[derive(Debug, Clone)]
pub struct Subquery {
    pub table: SubqueryTable,
    pub select: FieldSpec,
    pub condition: Vec<Condition>,
}

impl Subquery {
    pub fn new(table: impl Into<String>, select: impl Into<String>, condition: Vec<Condition>) -> Self {
        Self {
            table: SubqueryTable::Name(table.into()),
            select: FieldSpec::One(select.into()),
            condition,
        }
    }

    pub fn for_schema(
        schema: Arc<EntitySchema>,
        select: impl Into<String>,
        condition: Vec<Condition>,
    ) -> Self {
        Self {
            table: SubqueryTable::Schema(schema),
            select: FieldSpec::One(select.into()),
            condition,
        }
    }

    fn compile(&self) -> (String, Vec<Value>) {
        let table = match &self.table {
            SubqueryTable::Name(name) => escape_id(name),
            SubqueryTable::Schema(schema) => schema.qualified_table().unwrap_or_default(),
        };
        let statement = select_statement(&table, &self.condition, &self.select, &OrderBy::default(), None, None);
        (statement.sql, statement.args)
    }
}

/// A condition node's value.
#[derive(Debug, Clone)]
pub enum ConditionValue {
    /// A scalar, parameterized as `?`
    Value(Value),
    /// A list, parameterized as one `?` per element
    List(Vec<Value>),
    /// A raw SQL fragment inlined verbatim, never parameterized; escaping
    /// is the caller's responsibility
    Raw(String),
    /// A correlated sub-query, recursively compiled
    Subquery(Subquery),
}

impl From<Value> for ConditionValue {
    fn from(value: Value) -> Self {
        ConditionValue::Value(value)
    }
}

impl From<Vec<Value>> for ConditionValue {
    fn from(values: Vec<Value>) -> Self {
        ConditionValue::List(values)
    }
}

impl From<Subquery> for ConditionValue {
    fn from(subquery: Subquery) -> Self {
        ConditionValue::Subquery(subquery)
    }
}

/// One filter node. Shorthand key/value pairs construct via
/// [`Condition::new`]; the explicit shape takes an operator and an optional
/// `OR` connective.
#[derive(Debug, Clone)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    pub value: ConditionValue,
    pub connective: Connective,
}

impl Condition {
    /// Shorthand equality node.
    pub fn new(field: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        Self {
            field: field.into(),
            operator: "=".to_string(),
            value: value.into(),
            connective: Connective::And,
        }
    }

    pub fn with_operator(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<ConditionValue>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
            connective: Connective::And,
        }
    }

    /// Join this node onto the previous one with `OR` instead of `AND`.
    pub fn or(mut self) -> Self {
        self.connective = Connective::Or;
        self
    }
}

/// A compiled WHERE clause: text plus its ordered argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub clause: String,
    pub args: Vec<Value>,
}

/// Resolve an operator case-insensitively against the fixed set.
fn resolve_operator(operator: &str) -> String {
    let lower = operator.to_lowercase();
    if !lower.is_empty() && OPERATORS.contains(&lower.as_str()) {
        lower.to_uppercase()
    } else {
        "=".to_string()
    }
}

fn placeholders(count: usize) -> String {
    let marks: Vec<&str> = std::iter::repeat("?").take(count).collect();
    format!("({})", marks.join(", "))
}

/// Quote a scalar for the LIKE literal-inlining path.
fn like_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        other => format!("'{}'", other),
    }
}

/// Compile a condition list, preserving insertion order.
///
/// Empty input produces an empty clause and empty args; non-empty output is
/// prefixed with ` WHERE `.
pub fn build_where(conditions: &[Condition]) -> WhereClause {
    let mut clause = String::new();
    let mut args: Vec<Value> = Vec::new();

    for condition in conditions {
        let resolved = resolve_operator(&condition.operator);

        // Operator-specific transforms decide the emitted operator text,
        // the placeholder, and which values join the argument list.
        let (operator, placeholder, mut new_args): (String, String, Vec<Value>) =
            match (resolved.as_str(), &condition.value) {
                ("IN" | "NOT IN", ConditionValue::List(items)) => {
                    (resolved.clone(), placeholders(items.len()), items.clone())
                }
                ("IN" | "NOT IN", ConditionValue::Value(scalar)) => {
                    (resolved.clone(), placeholders(1), vec![scalar.clone()])
                }
                // The LIKE value is inlined as a quoted literal rather than
                // parameterized. Inherited quirk, reproduced exactly; the
                // injection risk is the caller's.
                ("LIKE" | "NOT LIKE", ConditionValue::Value(scalar)) => {
                    (resolved.clone(), like_literal(scalar), Vec::new())
                }
                // Null equality rewrites clear the operator entirely.
                ("=", ConditionValue::Value(Value::Null)) => {
                    (String::new(), "IS NULL".to_string(), Vec::new())
                }
                ("!=", ConditionValue::Value(Value::Null)) => {
                    (String::new(), "IS NOT NULL".to_string(), Vec::new())
                }
                (_, ConditionValue::Subquery(subquery)) => {
                    let (sql, sub_args) = subquery.compile();
                    (resolved.clone(), format!("({})", sql), sub_args)
                }
                (_, ConditionValue::Raw(fragment)) => {
                    (resolved.clone(), fragment.clone(), Vec::new())
                }
                (_, ConditionValue::List(items)) => {
                    (resolved.clone(), placeholders(items.len()), items.clone())
                }
                (_, ConditionValue::Value(scalar)) => {
                    (resolved.clone(), "?".to_string(), vec![scalar.clone()])
                }
            };

        if !clause.is_empty() {
            clause.push(' ');
            clause.push_str(condition.connective.as_str());
            clause.push(' ');
        }

        let field = json_field_notation(&condition.field);
        if operator.is_empty() {
            clause.push_str(&format!("{} {}", field, placeholder));
        } else {
            clause.push_str(&format!("{} {} {}", field, operator, placeholder));
        }
        args.append(&mut new_args);
    }

    if clause.is_empty() {
        WhereClause {
            clause,
            args,
        }
    } else {
        WhereClause {
            clause: format!(" WHERE {}", clause),
            args,
        }
    }
}
