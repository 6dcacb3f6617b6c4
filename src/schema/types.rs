//! Schema types and the field type lattice

use crate::types::{JsonObject, JsonValue, DELETED_FIELD};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Inferred type of a field
///
/// The types form a join-semilattice with `Null` at the bottom and `String`
/// at the top; see [`FieldType::join`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array { items: Box<FieldType> },
    Object { fields: Vec<Field> },
}

impl FieldType {
    /// Type of a single JSON value
    pub fn of(value: &JsonValue) -> FieldType {
        match value {
            JsonValue::Null => FieldType::Null,
            JsonValue::Bool(_) => FieldType::Boolean,
            // integers beyond the signed 64-bit range are typed as numbers
            JsonValue::Number(n) if n.is_i64() => FieldType::Integer,
            JsonValue::Number(_) => FieldType::Number,
            JsonValue::String(_) => FieldType::String,
            JsonValue::Array(items) => FieldType::Array {
                items: Box::new(
                    items
                        .iter()
                        .map(FieldType::of)
                        .fold(FieldType::Null, |acc, t| acc.join(&t)),
                ),
            },
            JsonValue::Object(map) => FieldType::Object {
                fields: fields_of(map),
            },
        }
    }

    /// Least upper bound of two types
    ///
    /// - `t ⊔ t = t`, `Null ⊔ t = t`
    /// - `Integer ⊔ Number = Number`
    /// - `Array(a) ⊔ Array(b) = Array(a ⊔ b)`
    /// - `Object ⊔ Object` merges fields by name; one-sided fields become nullable
    /// - anything else widens to `String`
    #[must_use]
    pub fn join(&self, other: &FieldType) -> FieldType {
        match (self, other) {
            (a, b) if a == b => a.clone(),
            (FieldType::Null, t) | (t, FieldType::Null) => t.clone(),
            (FieldType::Integer, FieldType::Number) | (FieldType::Number, FieldType::Integer) => {
                FieldType::Number
            }
            (FieldType::Array { items: a }, FieldType::Array { items: b }) => FieldType::Array {
                items: Box::new(a.join(b)),
            },
            (FieldType::Object { fields: a }, FieldType::Object { fields: b }) => {
                FieldType::Object {
                    fields: merge_fields(a, b),
                }
            }
            _ => FieldType::String,
        }
    }

    /// Check whether this is a scalar type
    pub fn is_scalar(&self) -> bool {
        !matches!(self, FieldType::Array { .. } | FieldType::Object { .. })
    }

    /// Short type name
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Null => "null",
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::String => "string",
            FieldType::Array { .. } => "array",
            FieldType::Object { .. } => "object",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Array { items } => write!(f, "array<{items}>"),
            FieldType::Object { fields } => {
                write!(f, "object<")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, ">")
            }
            other => write!(f, "{}", other.name()),
        }
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: FieldType,
    pub nullable: bool,
}

impl Field {
    /// Create a field
    pub fn new(name: impl Into<String>, data_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    /// Field observed from one value; nullable only if the value is null
    pub fn observed(name: impl Into<String>, value: &JsonValue) -> Self {
        Self::new(name, FieldType::of(value), value.is_null())
    }

    fn join(&self, other: &Field) -> Field {
        Field {
            name: self.name.clone(),
            data_type: self.data_type.join(&other.data_type),
            nullable: self.nullable || other.nullable,
        }
    }

    fn into_nullable(mut self) -> Field {
        self.nullable = true;
        self
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.data_type)?;
        if self.nullable {
            write!(f, "?")?;
        }
        Ok(())
    }
}

fn fields_of(map: &JsonObject) -> Vec<Field> {
    let mut fields: Vec<Field> = map
        .iter()
        .map(|(name, value)| Field::observed(name.clone(), value))
        .collect();
    fields.sort_by(|a, b| a.name.cmp(&b.name));
    fields
}

/// Merge two name-sorted field lists
fn merge_fields(a: &[Field], b: &[Field]) -> Vec<Field> {
    let mut merged = Vec::with_capacity(a.len().max(b.len()));
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        match a[i].name.cmp(&b[j].name) {
            Ordering::Less => {
                merged.push(a[i].clone().into_nullable());
                i += 1;
            }
            Ordering::Greater => {
                merged.push(b[j].clone().into_nullable());
                j += 1;
            }
            Ordering::Equal => {
                merged.push(a[i].join(&b[j]));
                i += 1;
                j += 1;
            }
        }
    }
    merged.extend(a[i..].iter().cloned().map(Field::into_nullable));
    merged.extend(b[j..].iter().cloned().map(Field::into_nullable));
    merged
}

/// Ordered set of columns for one read operation
///
/// Fields are kept sorted by name, which makes [`Schema::merge`] commutative
/// and associative regardless of the order documents were sampled in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Schema with no columns
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from fields in any order
    pub fn new(mut fields: Vec<Field>) -> Self {
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        fields.dedup_by(|b, a| {
            if a.name == b.name {
                *a = a.join(b);
                true
            } else {
                false
            }
        });
        Self { fields }
    }

    /// Schema of one document; the tombstone marker is never a column
    pub fn from_document(doc: &JsonObject) -> Self {
        let fields = fields_of(doc)
            .into_iter()
            .filter(|f| f.name != DELETED_FIELD)
            .collect();
        Self { fields }
    }

    /// Least upper bound of two schemas
    #[must_use]
    pub fn merge(&self, other: &Schema) -> Schema {
        Schema {
            fields: merge_fields(&self.fields, &other.fields),
        }
    }

    /// All fields in column order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Column names in order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    /// Position of a field
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .binary_search_by(|f| f.name.as_str().cmp(name))
            .ok()
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check for an empty schema
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Replace nested objects with dotted top-level columns
    ///
    /// `{address: {city}}` becomes `address.city`; a nested column is nullable
    /// if it or any ancestor is. Arrays are kept as they are.
    #[must_use]
    pub fn flatten(&self) -> Schema {
        let mut flat = Vec::new();
        for field in &self.fields {
            flatten_into(&mut flat, &field.name, &field.data_type, field.nullable);
        }
        Schema::new(flat)
    }
}

fn flatten_into(out: &mut Vec<Field>, name: &str, data_type: &FieldType, nullable: bool) {
    match data_type {
        FieldType::Object { fields } if !fields.is_empty() => {
            for child in fields {
                flatten_into(
                    out,
                    &format!("{name}.{}", child.name),
                    &child.data_type,
                    nullable || child.nullable,
                );
            }
        }
        other => out.push(Field::new(name, other.clone(), nullable)),
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for field in &self.fields {
            writeln!(f, "{field}")?;
        }
        Ok(())
    }
}
