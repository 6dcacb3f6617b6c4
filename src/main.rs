//! Cloudant connector CLI
//!
//! Command-line interface for reading and writing Cloudant/CouchDB documents
//! as tabular data

use clap::Parser;
use cloudant_connector::cli::{Cli, Runner};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Runner::new(cli).run().await?;
    Ok(())
}
