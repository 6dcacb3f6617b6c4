//! Output module
//!
//! Handles Arrow RecordBatch creation and file output.
//!
//! # Overview
//!
//! This module provides utilities for:
//! - Mapping the inferred schema onto Arrow types
//! - Converting decoded rows to Arrow RecordBatches and back to JSON
//! - Writing Parquet files and JSON lines

mod schema;
mod writer;

pub use schema::{arrow_to_json, rows_to_batch, to_arrow_schema, to_arrow_type};
pub use writer::{write_json_lines, ParquetWriter, ParquetWriterConfig};
