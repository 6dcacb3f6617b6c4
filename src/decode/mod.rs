//! Document decoder module
//!
//! # Overview
//!
//! Turns raw store documents into rows of the inferred schema. Tombstones
//! and design documents are rejected here, so every read mode excludes them
//! the same way.

mod decoders;
mod types;

pub use decoders::{coerce, flatten_document, is_data_document, DocumentDecoder};
pub use types::Row;
