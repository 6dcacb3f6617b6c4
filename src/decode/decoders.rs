//! Document decoding
//!
//! Shapes raw documents into rows of a fixed schema: missing fields become
//! null, undeclared fields are dropped and values are coerced to the column
//! type.

use super::types::Row;
use crate::schema::{FieldType, Schema};
use crate::types::{is_deleted, is_design_doc_id, JsonObject, JsonValue, ID_FIELD};

/// Decodes documents against a schema
#[derive(Debug, Clone)]
pub struct DocumentDecoder {
    schema: Schema,
    flatten: bool,
}

impl DocumentDecoder {
    /// Create a decoder; with `flatten` nested objects map to dotted columns
    pub fn new(schema: Schema, flatten: bool) -> Self {
        Self { schema, flatten }
    }

    /// Schema rows are decoded against
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Decode one document into a schema-shaped object
    ///
    /// Returns `None` for tombstones, design documents and non-objects.
    pub fn decode(&self, doc: &JsonValue) -> Option<JsonObject> {
        if !is_data_document(doc) {
            return None;
        }
        let map = doc.as_object()?;
        let flat;
        let source = if self.flatten {
            flat = flatten_document(map);
            &flat
        } else {
            map
        };

        Some(
            self.schema
                .fields()
                .iter()
                .map(|field| {
                    let value = source
                        .get(&field.name)
                        .map_or(JsonValue::Null, |v| coerce(v, &field.data_type));
                    (field.name.clone(), value)
                })
                .collect(),
        )
    }

    /// Project a decoded object onto output columns
    pub fn project(&self, decoded: &JsonObject, output: &Schema) -> Row {
        Row(output
            .fields()
            .iter()
            .map(|field| decoded.get(&field.name).cloned().unwrap_or(JsonValue::Null))
            .collect())
    }
}

/// Check whether a document is user data (not a tombstone or design document)
pub fn is_data_document(doc: &JsonValue) -> bool {
    if !doc.is_object() || is_deleted(doc) {
        return false;
    }
    !doc.get(ID_FIELD)
        .and_then(JsonValue::as_str)
        .is_some_and(is_design_doc_id)
}

/// Coerce a value to a column type
///
/// Anything under a `String` column is rendered as text (arrays and objects
/// as JSON); other mismatches become null.
pub fn coerce(value: &JsonValue, data_type: &FieldType) -> JsonValue {
    match (data_type, value) {
        (_, JsonValue::Null) | (FieldType::Null, _) => JsonValue::Null,
        (FieldType::Boolean, JsonValue::Bool(_)) | (FieldType::String, JsonValue::String(_)) => {
            value.clone()
        }
        (FieldType::Integer, JsonValue::Number(n)) if n.is_i64() => value.clone(),
        (FieldType::Number, JsonValue::Number(_)) => value.clone(),
        (FieldType::String, other) => JsonValue::String(other.to_string()),
        (FieldType::Array { items }, JsonValue::Array(values)) => {
            JsonValue::Array(values.iter().map(|v| coerce(v, items)).collect())
        }
        (FieldType::Object { fields }, JsonValue::Object(map)) => JsonValue::Object(
            fields
                .iter()
                .map(|field| {
                    let value = map
                        .get(&field.name)
                        .map_or(JsonValue::Null, |v| coerce(v, &field.data_type));
                    (field.name.clone(), value)
                })
                .collect(),
        ),
        _ => JsonValue::Null,
    }
}

/// Replace nested objects with dotted keys; empty objects and arrays are kept
pub fn flatten_document(doc: &JsonObject) -> JsonObject {
    let mut out = JsonObject::new();
    for (key, value) in doc {
        flatten_value(&mut out, key.clone(), value);
    }
    out
}

fn flatten_value(out: &mut JsonObject, key: String, value: &JsonValue) {
    match value {
        JsonValue::Object(map) if !map.is_empty() => {
            for (child, v) in map {
                flatten_value(out, format!("{key}.{child}"), v);
            }
        }
        other => {
            out.insert(key, other.clone());
        }
    }
}
