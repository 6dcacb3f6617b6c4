//! Row writer module
//!
//! Turns outgoing rows into documents and persists them with `_bulk_docs`.
//!
//! # Overview
//!
//! - Rows arrive as JSON objects, Arrow RecordBatches or a stream
//! - Documents are buffered into [`WriteBatch`]es of `bulkSize` documents
//! - Each bulk call reports per-document status; failures are collected in
//!   the [`WriteSummary`] and fail the operation with
//!   [`Error::Write`](crate::error::Error::Write)
//! - With `createDBOnSave` the database is created before the first call
//! - With `conflictPolicy=overwrite` conflicted documents are resubmitted
//!   once at their current revision
//! - Partitions write concurrently; a transport error in one partition ends
//!   with [`Error::WriteAborted`](crate::error::Error::WriteAborted), which
//!   still counts what was stored

mod bulk;
mod types;

pub use bulk::{prepare_document, write_partitions, RowWriter};
pub use types::{WriteBatch, WriteSummary};
