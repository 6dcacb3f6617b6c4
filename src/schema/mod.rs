//! Schema inference module
//!
//! Infers one tabular schema from a sample of heterogeneous JSON documents.
//!
//! # Features
//!
//! - **Type Lattice**: Conflicting field types are unified by a deterministic,
//!   order-independent join (`Integer ⊔ Number = Number`, otherwise `String`)
//! - **Nullable Detection**: Fields missing from some documents become nullable
//! - **Nested Support**: Objects and arrays keep their structure, or are
//!   flattened into dotted columns on request
//! - **Document Filtering**: Tombstones and design documents are never sampled

mod inference;
mod types;

pub use inference::{infer_schema, merge_schemas, SchemaInferrer};
pub use types::{Field, FieldType, Schema};
