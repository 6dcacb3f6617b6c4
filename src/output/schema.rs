//! Arrow conversion
//!
//! Maps the inferred schema onto Arrow types, builds RecordBatches from
//! decoded rows and turns RecordBatches back into JSON documents for writes.

use crate::decode::Row;
use crate::error::{Error, Result};
use crate::schema::{FieldType, Schema};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, ListArray, NullArray,
    StringArray, StructArray,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::datatypes::{
    DataType, Field, Fields, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type,
    Schema as ArrowSchema, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::record_batch::RecordBatch;
use serde_json::{Map, Number, Value};
use std::sync::Arc;

/// Arrow type of a column type
///
/// Every Arrow field is nullable: documents outside the sample may still
/// carry nulls or coerced-away values in any column.
pub fn to_arrow_type(data_type: &FieldType) -> DataType {
    match data_type {
        FieldType::Null => DataType::Null,
        FieldType::Boolean => DataType::Boolean,
        FieldType::Integer => DataType::Int64,
        FieldType::Number => DataType::Float64,
        FieldType::String => DataType::Utf8,
        FieldType::Array { items } => {
            DataType::List(Arc::new(Field::new("item", to_arrow_type(items), true)))
        }
        FieldType::Object { fields } => DataType::Struct(struct_fields(fields)),
    }
}

fn struct_fields(fields: &[crate::schema::Field]) -> Fields {
    fields
        .iter()
        .map(|f| Field::new(&f.name, to_arrow_type(&f.data_type), true))
        .collect()
}

/// Arrow schema of an inferred schema
pub fn to_arrow_schema(schema: &Schema) -> ArrowSchema {
    ArrowSchema::new(struct_fields(schema.fields()))
}

/// Build a RecordBatch from rows in schema column order
pub fn rows_to_batch(schema: &Schema, rows: &[Row]) -> Result<RecordBatch> {
    let arrow_schema = Arc::new(to_arrow_schema(schema));
    if rows.is_empty() {
        return Ok(RecordBatch::new_empty(arrow_schema));
    }

    let columns = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let values: Vec<Option<&Value>> = rows.iter().map(|row| row.get(i)).collect();
            build_array(&values, &to_arrow_type(&field.data_type))
        })
        .collect::<Result<Vec<ArrayRef>>>()?;

    RecordBatch::try_new(arrow_schema, columns)
        .map_err(|e| Error::output(format!("Failed to create RecordBatch: {e}")))
}

/// Build an Arrow array from JSON values
fn build_array(values: &[Option<&Value>], data_type: &DataType) -> Result<ArrayRef> {
    match data_type {
        DataType::Null => Ok(Arc::new(NullArray::new(values.len()))),

        DataType::Boolean => {
            let arr: BooleanArray = values.iter().map(|v| v.and_then(Value::as_bool)).collect();
            Ok(Arc::new(arr))
        }

        DataType::Int64 => {
            let arr: Int64Array = values.iter().map(|v| v.and_then(Value::as_i64)).collect();
            Ok(Arc::new(arr))
        }

        DataType::Float64 => {
            let arr: Float64Array = values.iter().map(|v| v.and_then(Value::as_f64)).collect();
            Ok(Arc::new(arr))
        }

        DataType::Utf8 => {
            let arr: StringArray = values
                .iter()
                .map(|v| {
                    v.and_then(|v| match v {
                        Value::Null => None,
                        Value::String(s) => Some(s.clone()),
                        other => Some(other.to_string()),
                    })
                })
                .collect();
            Ok(Arc::new(arr))
        }

        DataType::List(field) => build_list_array(values, field),

        DataType::Struct(fields) => build_struct_array(values, fields),

        other => Err(Error::output(format!("Unsupported column type {other}"))),
    }
}

/// Build a list array from JSON arrays
fn build_list_array(values: &[Option<&Value>], field: &Arc<Field>) -> Result<ArrayRef> {
    let mut items: Vec<Option<&Value>> = Vec::new();
    let mut offsets: Vec<i32> = vec![0];

    for value in values {
        if let Some(Value::Array(arr)) = value {
            items.extend(arr.iter().map(Some));
        }
        let offset = i32::try_from(items.len())
            .map_err(|_| Error::output("Array too large for i32 offset"))?;
        offsets.push(offset);
    }

    let items_array = build_array(&items, field.data_type())?;
    let nulls = presence(values, |v| v.is_array());
    let list = ListArray::try_new(
        Arc::clone(field),
        OffsetBuffer::new(offsets.into()),
        items_array,
        Some(nulls),
    )?;
    Ok(Arc::new(list))
}

/// Build a struct array from JSON objects
fn build_struct_array(values: &[Option<&Value>], fields: &Fields) -> Result<ArrayRef> {
    let children = fields
        .iter()
        .map(|field| {
            let child_values: Vec<Option<&Value>> = values
                .iter()
                .map(|v| v.and_then(|v| v.as_object()).and_then(|obj| obj.get(field.name())))
                .collect();
            build_array(&child_values, field.data_type())
        })
        .collect::<Result<Vec<ArrayRef>>>()?;

    let nulls = presence(values, |v| v.is_object());
    if fields.is_empty() {
        return Ok(Arc::new(StructArray::new_empty_fields(values.len(), Some(nulls))));
    }
    Ok(Arc::new(StructArray::try_new(fields.clone(), children, Some(nulls))?))
}

fn presence(values: &[Option<&Value>], valid: impl Fn(&Value) -> bool) -> NullBuffer {
    NullBuffer::from(
        values
            .iter()
            .map(|v| v.is_some_and(&valid))
            .collect::<Vec<bool>>(),
    )
}

/// Convert an Arrow RecordBatch to JSON records
///
/// Returns one JSON object per row; null cells become JSON nulls.
pub fn arrow_to_json(batch: &RecordBatch) -> Result<Vec<Value>> {
    let schema = batch.schema();
    (0..batch.num_rows())
        .map(|row| {
            let mut record = Map::new();
            for (field, column) in schema.fields().iter().zip(batch.columns()) {
                record.insert(field.name().clone(), array_value_to_json(column.as_ref(), row)?);
            }
            Ok(Value::Object(record))
        })
        .collect()
}

/// Convert a single array element to JSON
fn array_value_to_json(array: &dyn Array, row: usize) -> Result<Value> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }

    let value = match array.data_type() {
        DataType::Null => Value::Null,
        DataType::Boolean => Value::Bool(array.as_boolean().value(row)),
        DataType::Int8 => array.as_primitive::<Int8Type>().value(row).into(),
        DataType::Int16 => array.as_primitive::<Int16Type>().value(row).into(),
        DataType::Int32 => array.as_primitive::<Int32Type>().value(row).into(),
        DataType::Int64 => array.as_primitive::<Int64Type>().value(row).into(),
        DataType::UInt8 => array.as_primitive::<UInt8Type>().value(row).into(),
        DataType::UInt16 => array.as_primitive::<UInt16Type>().value(row).into(),
        DataType::UInt32 => array.as_primitive::<UInt32Type>().value(row).into(),
        DataType::UInt64 => array.as_primitive::<UInt64Type>().value(row).into(),
        DataType::Float32 => float(f64::from(array.as_primitive::<Float32Type>().value(row))),
        DataType::Float64 => float(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => Value::String(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::String(array.as_string::<i64>().value(row).to_string()),
        DataType::List(_) => {
            let items = array.as_list::<i32>().value(row);
            Value::Array(
                (0..items.len())
                    .map(|i| array_value_to_json(items.as_ref(), i))
                    .collect::<Result<_>>()?,
            )
        }
        DataType::Struct(_) => {
            let arr = array.as_struct();
            let mut obj = Map::new();
            for (field, column) in arr.fields().iter().zip(arr.columns()) {
                obj.insert(field.name().clone(), array_value_to_json(column.as_ref(), row)?);
            }
            Value::Object(obj)
        }
        other => {
            return Err(Error::output(format!(
                "Cannot convert Arrow type {other} to JSON"
            )))
        }
    };
    Ok(value)
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}
