//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::{ConnectionConfig, ReadOptions, UnknownKeyPolicy, WriteOptions};
use crate::connector::{CloudantConnector, Connector};
use crate::error::{Error, Result};
use crate::output::{to_arrow_schema, write_json_lines, ParquetWriter, ParquetWriterConfig};
use crate::query::Filter;
use crate::types::JsonValue;
use futures::StreamExt;
use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        let connector = CloudantConnector::new(self.connection_config()?)?;
        match &self.cli.command {
            Commands::Check => self.check(&connector).await,
            Commands::Schema => self.schema(&connector).await,
            Commands::Read {
                output,
                columns,
                equals,
                batch_size,
            } => {
                self.read(
                    &connector,
                    output.as_deref(),
                    columns.clone(),
                    equals,
                    *batch_size,
                )
                .await
            }
            Commands::Write { input, partitions } => {
                self.write(&connector, input, *partitions).await
            }
            Commands::CreateDb { name } => {
                let database = connector.resolve_database(name.as_deref())?;
                let created = connector.client().create_database(&database).await?;
                self.output_message(&json!({
                    "type": "DATABASE",
                    "database": database,
                    "created": created
                }));
                Ok(())
            }
            Commands::DeleteDb { name } => {
                let database = connector.resolve_database(name.as_deref())?;
                let deleted = connector.client().delete_database(&database).await?;
                self.output_message(&json!({
                    "type": "DATABASE",
                    "database": database,
                    "deleted": deleted
                }));
                Ok(())
            }
        }
    }

    /// Connection settings from the config file and flags
    fn connection_config(&self) -> Result<ConnectionConfig> {
        let mut config = match (&self.cli.config, &self.cli.url) {
            (_, Some(url)) => {
                let from_url = ConnectionConfig::from_url(url)?;
                match &self.cli.config {
                    Some(path) => ConnectionConfig {
                        protocol: from_url.protocol,
                        host: from_url.host,
                        ..ConnectionConfig::from_file(path)?
                    },
                    None => from_url,
                }
            }
            (Some(path), None) => ConnectionConfig::from_file(path)?,
            (None, None) => {
                return Err(Error::config(
                    "No server given (use --url or --config)",
                ))
            }
        };

        if let Some(username) = &self.cli.username {
            config.username = Some(username.clone());
        }
        if let Some(password) = &self.cli.password {
            config.password = Some(password.clone());
        }
        if let Some(api_key) = &self.cli.api_key {
            config.api_key = Some(api_key.clone());
        }
        if let Some(database) = &self.cli.database {
            config.database = Some(database.clone());
        }
        config.validate()?;
        Ok(config)
    }

    /// `-o key=value` pairs
    fn option_pairs(&self) -> Result<Vec<(String, String)>> {
        self.cli
            .options
            .iter()
            .map(|raw| {
                raw.split_once('=')
                    .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                    .ok_or_else(|| Error::config(format!("Option '{raw}' is not key=value")))
            })
            .collect()
    }

    fn read_options(&self) -> Result<ReadOptions> {
        ReadOptions::from_map(self.option_pairs()?, UnknownKeyPolicy::Reject)
    }

    fn write_options(&self) -> Result<WriteOptions> {
        WriteOptions::from_map(self.option_pairs()?, UnknownKeyPolicy::Reject)
    }

    async fn check(&self, connector: &CloudantConnector) -> Result<()> {
        let result = connector.check().await?;
        self.output_message(&json!({
            "type": "CONNECTION_STATUS",
            "connectionStatus": result
        }));
        if result.success {
            Ok(())
        } else {
            Err(Error::connection(
                result.message.unwrap_or_else(|| "check failed".to_string()),
            ))
        }
    }

    async fn schema(&self, connector: &CloudantConnector) -> Result<()> {
        let options = self.read_options()?;
        let schema = connector.discover_schema(&options).await?;
        self.output_message(&json!({
            "type": "SCHEMA",
            "database": connector.resolve_database(options.database.as_deref())?,
            "schema": schema
        }));
        Ok(())
    }

    async fn read(
        &self,
        connector: &CloudantConnector,
        output: Option<&Path>,
        columns: Option<Vec<String>>,
        equals: &[String],
        batch_size: usize,
    ) -> Result<()> {
        let start = Instant::now();
        let options = self.read_options()?;
        let filters = equals
            .iter()
            .map(|raw| parse_equality(raw))
            .collect::<Result<Vec<_>>>()?;
        let plan = connector.plan_read(&options, filters, columns).await?;
        let schema = plan.output_schema();

        let rows = match output {
            Some(path) => {
                let arrow_schema = Arc::new(to_arrow_schema(&schema));
                let mut writer =
                    ParquetWriter::new(path, arrow_schema, &ParquetWriterConfig::new().zstd())?;
                let mut batches = Box::pin(connector.read_batches(&plan, batch_size));
                while let Some(batch) = batches.next().await {
                    writer.write(&batch?)?;
                }
                writer.close()?
            }
            None => {
                let mut total = 0;
                for index in 0..plan.len() {
                    let mut reader = connector.partition_reader(&plan, index)?;
                    loop {
                        let rows = reader.next_rows(plan.reader_options.page_size).await?;
                        if rows.is_empty() {
                            break;
                        }
                        let mut buffer = Vec::new();
                        total += write_json_lines(&mut buffer, &schema, &rows)?;
                        std::io::stdout().write_all(&buffer)?;
                    }
                }
                total
            }
        };

        info!(
            "Read {rows} row(s) from {} in {}ms",
            plan.database,
            start.elapsed().as_millis()
        );
        if output.is_some() {
            self.output_message(&json!({
                "type": "READ",
                "database": plan.database,
                "partitions": plan.len(),
                "rows": rows
            }));
        }
        Ok(())
    }

    async fn write(&self, connector: &CloudantConnector, input: &Path, partitions: usize) -> Result<()> {
        let options = self.write_options()?;
        let docs = read_json_lines(input)?;
        let total = docs.len();

        let summary = if partitions > 1 {
            let chunk = total.div_ceil(partitions).max(1);
            let parts: Vec<Vec<JsonValue>> = docs.chunks(chunk).map(<[JsonValue]>::to_vec).collect();
            connector.write_partitioned(&options, parts, partitions).await?
        } else {
            connector.write(&options, docs).await?
        };

        self.output_message(&json!({
            "type": "WRITE",
            "documents": total,
            "written": summary.written,
            "batches": summary.batches
        }));
        Ok(())
    }

    /// Output a message
    fn output_message(&self, msg: &JsonValue) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

/// Parse `column=value`; the value is JSON when it parses, else a string
fn parse_equality(raw: &str) -> Result<Filter> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| Error::config(format!("Filter '{raw}' is not column=value")))?;
    let value = serde_json::from_str::<JsonValue>(value)
        .unwrap_or_else(|_| JsonValue::String(value.to_string()));
    Ok(Filter::eq(column.trim(), value))
}

/// One JSON document per non-empty line
fn read_json_lines(path: &Path) -> Result<Vec<JsonValue>> {
    let contents = fs::read_to_string(path)?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| {
                Error::decode(format!("{}:{}: {e}", path.display(), n + 1))
            })
        })
        .collect()
}
