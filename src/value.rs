//! Value helpers shared across the builders
//!
//! Identifier escaping and the MySQL JSON-subpath notation live here, along
//! with the JavaScript-style truthiness test the diff and serializer passes
//! rely on.

use serde_json::{Map, Value};

/// Wrap an identifier in backticks, doubling any embedded backtick.
pub(crate) fn escape_id(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Compile a possibly-dotted column name into its MySQL expression.
///
/// A bare name escapes to `` `name` ``; a dotted path compiles to a JSON
/// extraction against the first segment: `a.b.c` becomes
/// `` `a`->>"$.b.c" ``.
pub(crate) fn json_field_notation(col: &str) -> String {
    let mut segments = col.split('.');
    let field = segments.next().unwrap_or(col);
    let path: Vec<&str> = segments.collect();
    if path.is_empty() {
        escape_id(field)
    } else {
        format!("{}->>\"$.{}\"", escape_id(field), path.join("."))
    }
}

/// Like [`json_field_notation`], but aliases JSON extractions back to their
/// dotted name for use in a projection list.
pub(crate) fn fix_field_name(col: &str) -> String {
    let field = json_field_notation(col);
    if field.contains("->>") {
        format!("{} as {}", field, escape_id(col))
    } else {
        field
    }
}

/// JavaScript-style truthiness: null, false, zero and the empty string are
/// falsy; arrays and objects (even empty ones) are truthy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Set a possibly-dotted key inside a property bag, creating intermediate
/// objects along the path. A non-object intermediate value is replaced.
pub(crate) fn set_path(map: &mut Map<String, Value>, key: &str, value: Value) {
    let mut segments = key.split('.');
    let first = match segments.next() {
        Some(s) => s,
        None => return,
    };
    let rest: Vec<&str> = segments.collect();
    if rest.is_empty() {
        map.insert(first.to_string(), value);
        return;
    }

    let slot = map
        .entry(first.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    let mut current = slot;
    for segment in &rest[..rest.len() - 1] {
        let object = match current.as_object_mut() {
            Some(object) => object,
            None => return,
        };
        let inner = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !inner.is_object() {
            *inner = Value::Object(Map::new());
        }
        current = inner;
    }
    if let Some(object) = current.as_object_mut() {
        object.insert(rest[rest.len() - 1].to_string(), value);
    }
}
