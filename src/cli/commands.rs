//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cloudant/CouchDB tabular connector CLI
#[derive(Parser, Debug)]
#[command(name = "cloudant-connector")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Connection settings file (YAML)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Server URL, e.g. http://localhost:5984 (overrides the config file host)
    #[arg(short, long, global = true)]
    pub url: Option<String>,

    /// Username for basic auth
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// Password for basic auth
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// IAM api key
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Database (overrides the config file default)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Read or write option as key=value (repeatable), e.g. -o pageSize=500
    #[arg(short = 'o', long = "option", global = true, value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Output format for status messages
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Test connection and credentials
    Check,

    /// Infer and print the schema of a database
    Schema,

    /// Read documents as rows
    Read {
        /// Parquet file to write (default: JSON lines on stdout)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Columns to emit (comma-separated, default: all)
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,

        /// Equality filter as column=value (repeatable); value is JSON or a bare string
        #[arg(long = "eq", value_name = "COLUMN=VALUE")]
        equals: Vec<String>,

        /// Rows per Arrow batch when writing Parquet
        #[arg(long, default_value = "1000")]
        batch_size: usize,
    },

    /// Write documents from a JSON lines file
    Write {
        /// Input file with one JSON object per line
        input: PathBuf,

        /// Split the input into this many concurrently written partitions
        #[arg(long, default_value = "1")]
        partitions: usize,
    },

    /// Create a database
    CreateDb {
        /// Database name (default: --database)
        name: Option<String>,
    },

    /// Delete a database
    DeleteDb {
        /// Database name (default: --database)
        name: Option<String>,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
