//! Connector facade
//!
//! Defines the [`Connector`] trait the host engine talks to and the
//! [`CloudantConnector`] implementation tying the transport, schema
//! inference, query translation, partition planning, reading and writing
//! together.

use crate::config::{ConnectionConfig, ReadOptions, WriteOptions};
use crate::decode::Row;
use crate::error::{Error, Result};
use crate::pagination::{paginator_for, NextPage, Paginator};
use crate::partition::{Partition, PartitionPlan, PartitionPlanner, PartitionScope};
use crate::query::{translate, Filter, QueryDescriptor, TranslatedQuery};
use crate::reader::{PartitionReader, ReaderOptions};
use crate::schema::{Schema, SchemaInferrer};
use crate::store::CouchClient;
use crate::types::JsonValue;
use crate::writer::{write_partitions, RowWriter, WriteSummary};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

// ============================================================================
// Check Result
// ============================================================================

/// Result of a connection check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Whether the check succeeded
    pub success: bool,

    /// Error message if failed
    pub message: Option<String>,

    /// Server version reported by the store
    pub server_version: Option<String>,
}

impl CheckResult {
    /// Create a successful check result
    pub fn success(server_version: Option<String>) -> Self {
        Self {
            success: true,
            message: None,
            server_version,
        }
    }

    /// Create a failed check result
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            server_version: None,
        }
    }
}

// ============================================================================
// Read Plan
// ============================================================================

/// Everything needed to read one operation's partitions independently
#[derive(Debug, Clone)]
pub struct ReadPlan {
    /// Database being read
    pub database: String,
    /// Full inferred schema
    pub schema: Schema,
    /// Translated request shared by all partitions
    pub query: Arc<TranslatedQuery>,
    /// Partitions to read
    pub partitions: PartitionPlan,
    /// Per-partition reader settings
    pub reader_options: ReaderOptions,
}

impl ReadPlan {
    /// Schema of emitted rows
    pub fn output_schema(&self) -> Schema {
        self.query.output_schema(&self.schema)
    }

    /// Number of partitions
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Check whether the plan has no partitions
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Filters the store request does not evaluate
    pub fn residual_filters(&self) -> &[Filter] {
        &self.query.residual
    }
}

// ============================================================================
// Connector Trait
// ============================================================================

/// Narrow read/write contract offered to the host engine
#[async_trait]
pub trait Connector: Send + Sync {
    /// Tests connectivity and credentials
    async fn check(&self) -> Result<CheckResult>;

    /// Infers the tabular schema of a read
    async fn discover_schema(&self, options: &ReadOptions) -> Result<Schema>;

    /// Infers the schema, translates the request and splits it into partitions
    async fn plan_read(
        &self,
        options: &ReadOptions,
        filters: Vec<Filter>,
        columns: Option<Vec<String>>,
    ) -> Result<ReadPlan>;

    /// Persists documents, failing with [`Error::Write`] if any document failed
    async fn write(&self, options: &WriteOptions, docs: Vec<JsonValue>) -> Result<WriteSummary>;
}

// ============================================================================
// Cloudant Connector
// ============================================================================

/// Connector for one Cloudant/CouchDB account
#[derive(Debug, Clone)]
pub struct CloudantConnector {
    config: ConnectionConfig,
    client: CouchClient,
}

impl CloudantConnector {
    /// Create a connector from connection settings
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let client = CouchClient::from_config(&config)?;
        Ok(Self { config, client })
    }

    /// Connection settings
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Store client
    pub fn client(&self) -> &CouchClient {
        &self.client
    }

    /// Database named by the options, else the connection default
    pub fn resolve_database(&self, database: Option<&str>) -> Result<String> {
        database
            .or(self.config.database.as_deref())
            .map(str::to_string)
            .ok_or_else(|| Error::missing_field("database"))
    }

    /// Translate a read against a known schema and plan its partitions
    pub async fn plan_read_with_schema(
        &self,
        options: &ReadOptions,
        schema: Schema,
        filters: Vec<Filter>,
        columns: Option<Vec<String>>,
    ) -> Result<ReadPlan> {
        let database = self.resolve_database(options.database.as_deref())?;
        let mut descriptor =
            QueryDescriptor::from_options(options, self.config.endpoint).with_filters(filters);
        descriptor.columns = columns;

        let query = translate(&descriptor, &schema)?;
        let partitions = PartitionPlanner::new(&self.client, &database)
            .plan(&query, options.partitions)
            .await?;

        info!(
            "Planned {} read of {database}: {} partition(s), {} residual filter(s)",
            query.mode.name(),
            partitions.len(),
            query.residual.len()
        );

        Ok(ReadPlan {
            database,
            schema,
            query: Arc::new(query),
            partitions,
            reader_options: ReaderOptions::from(options),
        })
    }

    /// Reader for one partition of a plan
    pub fn partition_reader(&self, plan: &ReadPlan, index: usize) -> Result<PartitionReader> {
        let partition = plan.partitions.get(index).cloned().ok_or_else(|| {
            Error::config(format!(
                "partition {index} out of range (plan has {})",
                plan.len()
            ))
        })?;
        Ok(self.reader_for(plan, partition))
    }

    fn reader_for(&self, plan: &ReadPlan, partition: Partition) -> PartitionReader {
        PartitionReader::new(
            self.client.clone(),
            plan.database.clone(),
            partition,
            Arc::clone(&plan.query),
            plan.schema.clone(),
            plan.reader_options,
        )
    }

    /// Read every partition concurrently; rows come back in partition order
    pub async fn read_all(&self, plan: &ReadPlan) -> Result<Vec<Row>> {
        let readers = plan
            .partitions
            .iter()
            .map(|p| self.reader_for(plan, p.clone()).collect_rows());
        let parts = futures::future::try_join_all(readers).await?;
        Ok(parts.into_iter().flatten().collect())
    }

    /// Arrow batches of every partition, one partition after another
    pub fn read_batches(
        &self,
        plan: &ReadPlan,
        batch_size: usize,
    ) -> impl Stream<Item = Result<RecordBatch>> + Send {
        let readers: Vec<PartitionReader> = plan
            .partitions
            .iter()
            .map(|p| self.reader_for(plan, p.clone()))
            .collect();
        stream::iter(readers).flat_map(move |reader| reader.into_batches(batch_size))
    }

    /// Write independent partitions of documents concurrently
    pub async fn write_partitioned(
        &self,
        options: &WriteOptions,
        partitions: Vec<Vec<JsonValue>>,
        concurrency: usize,
    ) -> Result<WriteSummary> {
        let database = self.resolve_database(options.database.as_deref())?;
        write_partitions(&self.client, &database, options, partitions, concurrency).await
    }

    /// Write Arrow batches as documents
    pub async fn write_batches(
        &self,
        options: &WriteOptions,
        batches: &[RecordBatch],
    ) -> Result<WriteSummary> {
        let mut writer = self.writer(options)?;
        for batch in batches {
            writer.write_batch(batch).await?;
        }
        writer.finish().await
    }

    /// Writer for streaming input
    pub fn writer(&self, options: &WriteOptions) -> Result<RowWriter> {
        let database = self.resolve_database(options.database.as_deref())?;
        Ok(RowWriter::new(self.client.clone(), database, options))
    }

    /// Documents a read would sample, as a stream
    fn sample_stream(
        &self,
        database: String,
        paginator: Box<dyn Paginator>,
    ) -> impl Stream<Item = Result<JsonValue>> + Send {
        let client = self.client.clone();
        stream::try_unfold(paginator, move |mut paginator| {
            let client = client.clone();
            let database = database.clone();
            async move {
                match paginator.next_page(&client, &database).await? {
                    NextPage::Docs(docs) => Ok::<_, Error>(Some((docs, paginator))),
                    NextPage::Done => Ok(None),
                }
            }
        })
        .map_ok(|docs| stream::iter(docs.into_iter().map(Ok)))
        .try_flatten()
    }
}

#[async_trait]
impl Connector for CloudantConnector {
    async fn check(&self) -> Result<CheckResult> {
        let info = match self.client.server_info().await {
            Ok(info) => info,
            Err(e) => return Ok(CheckResult::failure(e.to_string())),
        };
        if let Some(database) = &self.config.database {
            match self.client.database_exists(database).await {
                Ok(true) => {}
                Ok(false) => {
                    return Ok(CheckResult::failure(format!(
                        "database '{database}' does not exist"
                    )))
                }
                Err(e) => return Ok(CheckResult::failure(e.to_string())),
            }
        }
        Ok(CheckResult::success(info.version))
    }

    async fn discover_schema(&self, options: &ReadOptions) -> Result<Schema> {
        let database = self.resolve_database(options.database.as_deref())?;
        let descriptor = QueryDescriptor::from_options(options, self.config.endpoint);
        let query = translate(&descriptor, &Schema::empty())?;

        let page_size = match options.schema_sample_size {
            Some(limit) => options.page_size.min(limit.max(1)),
            None => options.page_size,
        };
        let paginator = paginator_for(&query, &PartitionScope::Whole, page_size);
        debug!(
            "Sampling {database} via {} (limit {:?})",
            query.mode.name(),
            options.schema_sample_size
        );

        let schema = SchemaInferrer::new()
            .with_sample_size(options.schema_sample_size)
            .with_flatten(options.flatten)
            .infer_from_stream(self.sample_stream(database.clone(), paginator))
            .await
            .map_err(|e| match e {
                Error::SchemaInference { message } => {
                    Error::schema_inference(format!("{database}: {message}"))
                }
                other => other,
            })?;

        info!("Inferred {} column(s) for {database}", schema.len());
        Ok(schema)
    }

    async fn plan_read(
        &self,
        options: &ReadOptions,
        filters: Vec<Filter>,
        columns: Option<Vec<String>>,
    ) -> Result<ReadPlan> {
        let schema = self.discover_schema(options).await?;
        self.plan_read_with_schema(options, schema, filters, columns)
            .await
    }

    async fn write(&self, options: &WriteOptions, docs: Vec<JsonValue>) -> Result<WriteSummary> {
        let mut writer = self.writer(options)?;
        writer.write_all(docs).await?;
        let summary = writer.finish().await?;
        info!(
            "Wrote {} document(s) to {} in {} batch(es)",
            summary.written,
            self.resolve_database(options.database.as_deref())?,
            summary.batches
        );
        Ok(summary)
    }
}
