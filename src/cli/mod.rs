//! CLI module
//!
//! Command-line interface for the connector.
//!
//! # Commands
//!
//! - `check` - Test connection and credentials
//! - `schema` - Infer the schema of a database
//! - `read` - Read rows as JSON lines or into a Parquet file
//! - `write` - Write documents from a JSON lines file
//! - `create-db` / `delete-db` - Manage databases

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
