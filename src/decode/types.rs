//! Decoded row type

use crate::schema::Schema;
use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};

/// One output row, values in schema column order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(pub Vec<JsonValue>);

impl Row {
    /// Values in column order
    pub fn values(&self) -> &[JsonValue] {
        &self.0
    }

    /// Value at a column position
    pub fn get(&self, index: usize) -> Option<&JsonValue> {
        self.0.get(index)
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether the row has no values
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the values
    pub fn into_values(self) -> Vec<JsonValue> {
        self.0
    }

    /// Pair values with the column names of `schema`
    pub fn to_object(&self, schema: &Schema) -> JsonObject {
        schema
            .fields()
            .iter()
            .zip(&self.0)
            .map(|(field, value)| (field.name.clone(), value.clone()))
            .collect()
    }
}

impl From<Vec<JsonValue>> for Row {
    fn from(values: Vec<JsonValue>) -> Self {
        Row(values)
    }
}
