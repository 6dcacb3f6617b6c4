//! # Cloudant Connector
//!
//! Reads and writes Cloudant/CouchDB documents as tabular data for a
//! distributed processing engine.
//!
//! ## Features
//!
//! - **Schema inference**: a tabular schema merged from sampled JSON documents
//! - **Predicate pushdown**: filters translated into Mango selectors and `_id`
//!   key ranges, with exact client-side re-evaluation
//! - **Partitioned reads**: `_all_docs` split at probed key boundaries, paged
//!   lazily per partition into rows or Arrow RecordBatches
//! - **Bulk writes**: batched `_bulk_docs` with per-document failure reporting
//!   and optional database creation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cloudant_connector::{CloudantConnector, ConnectionConfig, Connector, ReadOptions};
//! use cloudant_connector::query::Filter;
//!
//! #[tokio::main]
//! async fn main() -> cloudant_connector::Result<()> {
//!     let config = ConnectionConfig::from_url("http://localhost:5984")?
//!         .with_credentials("admin", "pass")
//!         .with_database("animaldb");
//!     let connector = CloudantConnector::new(config)?;
//!
//!     let options = ReadOptions::new().with_partitions(4);
//!     let plan = connector
//!         .plan_read(&options, vec![Filter::eq("class", "mammal")], None)
//!         .await?;
//!     let rows = connector.read_all(&plan).await?;
//!     println!("{} rows", rows.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Connector Interface                       │
//! │  discover_schema() → Schema   plan_read() → ReadPlan            │
//! │  partition_reader(i) → Stream<Row>   write(rows) → WriteSummary │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬───────────┬─────────────┐
//! │  Schema  │   Query   │   Partition   │  Reader   │   Writer    │
//! ├──────────┼───────────┼───────────────┼───────────┼─────────────┤
//! │ Sampling │ Mango     │ Key probes    │ Paging    │ Bulk docs   │
//! │ Lattice  │ Key range │ Changes       │ Decoding  │ Conflicts   │
//! │ Flatten  │ Residual  │ Single        │ Arrow     │ Create DB   │
//! └──────────┴───────────┴───────────────┴───────────┴─────────────┘
//!                                │
//! ┌──────────────────────────────┴──────────────────────────────────┐
//! │        Store client: HTTP, retry, rate limit, auth              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the connector
pub mod error;

/// Common types and type aliases
pub mod types;

/// Authentication implementations
pub mod auth;

/// HTTP client with retry and rate limiting
pub mod http;

/// Typed document store client
pub mod store;

/// Connection settings and read/write options
pub mod config;

/// Schema inference from JSON documents
pub mod schema;

/// Filter translation into store requests
pub mod query;

/// Read partition planning
pub mod partition;

/// Pagination strategies per access mode
pub mod pagination;

/// Document decoding into rows
pub mod decode;

/// Per-partition row readers
pub mod reader;

/// Bulk document writer
pub mod writer;

/// Arrow/Parquet output
pub mod output;

/// Connector trait and facade
pub mod connector;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use config::{ConflictPolicy, ConnectionConfig, Endpoint, ReadOptions, WriteOptions};
pub use connector::{CheckResult, CloudantConnector, Connector, ReadPlan};
pub use decode::Row;
pub use schema::{FieldType, Schema};
pub use writer::WriteSummary;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
