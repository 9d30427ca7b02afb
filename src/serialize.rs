//! Per-field codec passes
//!
//! The schema declares which fields carry a codec (currently only the JSON
//! codec). `encode` runs before writes, `decode` after reads; both mutate
//! the entity's properties in place and are idempotent in either direction.

use serde_json::Value;

use crate::entity::Entity;
use crate::schema::Codec;
use crate::value::is_truthy;

/// Convert structured values into their textual encoding.
///
/// Fields whose value is falsy or already a string are left untouched.
pub fn encode(entity: &mut Entity) {
    for (field, codec) in entity.schema().serialized.clone() {
        let value = match entity.get(&field) {
            Some(value) if is_truthy(value) => value.clone(),
            _ => continue,
        };
        match codec {
            Codec::Json => {
                if !value.is_string() {
                    entity.set(&field, Value::String(value.to_string()));
                }
            }
        }
    }
}

/// Convert textual encodings back into structured values.
///
/// Fields whose value is falsy or already decoded are left untouched; a
/// string that does not parse stays a string.
pub fn decode(entity: &mut Entity) {
    for (field, codec) in entity.schema().serialized.clone() {
        let value = match entity.get(&field) {
            Some(value) if is_truthy(value) => value.clone(),
            _ => continue,
        };
        match codec {
            Codec::Json => {
                if let Value::String(text) = &value {
                    if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                        entity.set(&field, parsed);
                    }
                }
            }
        }
    }
}
