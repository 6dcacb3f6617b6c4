//! Lazy row production for one partition

use super::types::{ReadStats, ReaderOptions};
use crate::decode::{DocumentDecoder, Row};
use crate::error::{Error, Result};
use crate::output::rows_to_batch;
use crate::pagination::{paginator_for, NextPage, Paginator};
use crate::partition::Partition;
use crate::query::TranslatedQuery;
use crate::schema::Schema;
use crate::store::CouchClient;
use crate::types::JsonValue;
use arrow::record_batch::RecordBatch;
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Forward-only reader over one partition
///
/// Pages are fetched on demand. Each document is decoded against the
/// schema, checked against every filter of the query and projected onto the
/// requested columns. After an error or exhaustion the reader yields nothing
/// more.
pub struct PartitionReader {
    client: CouchClient,
    database: String,
    partition: Partition,
    query: Arc<TranslatedQuery>,
    paginator: Box<dyn Paginator>,
    decoder: DocumentDecoder,
    output: Schema,
    buffer: VecDeque<Row>,
    stats: ReadStats,
    /// Failure held back until the rows before it are handed out
    pending_error: Option<Error>,
    finished: bool,
}

impl PartitionReader {
    /// Create a reader; `schema` is the full inferred schema of the read
    pub fn new(
        client: CouchClient,
        database: impl Into<String>,
        partition: Partition,
        query: Arc<TranslatedQuery>,
        schema: Schema,
        options: ReaderOptions,
    ) -> Self {
        let paginator = paginator_for(&query, &partition.scope, options.page_size);
        let output = query.output_schema(&schema);
        Self {
            client,
            database: database.into(),
            partition,
            query,
            paginator,
            decoder: DocumentDecoder::new(schema, options.flatten),
            output,
            buffer: VecDeque::new(),
            stats: ReadStats::default(),
            pending_error: None,
            finished: false,
        }
    }

    /// Partition being read
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Schema of emitted rows
    pub fn schema(&self) -> &Schema {
        &self.output
    }

    /// Counters so far
    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    /// Next row, `None` once the partition is exhausted
    ///
    /// Transport failures are reported as [`Error::Read`] for this partition
    /// and end the reader.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        if let Some(e) = self.pending_error.take() {
            return Err(e);
        }
        loop {
            if let Some(row) = self.buffer.pop_front() {
                self.stats.rows_emitted += 1;
                return Ok(Some(row));
            }
            if self.finished {
                return Ok(None);
            }

            match self.paginator.next_page(&self.client, &self.database).await {
                Ok(NextPage::Docs(docs)) => {
                    self.stats.pages_fetched += 1;
                    self.absorb(docs);
                }
                Ok(NextPage::Done) => {
                    self.finished = true;
                    debug!(
                        "Partition {} of {} exhausted: {:?}",
                        self.partition.index, self.database, self.stats
                    );
                }
                Err(e) => {
                    self.finished = true;
                    warn!("Partition {} of {} failed: {e}", self.partition.index, self.database);
                    return Err(Error::read(self.partition.index, e));
                }
            }
        }
    }

    fn absorb(&mut self, docs: Vec<JsonValue>) {
        for doc in docs {
            self.stats.documents_seen += 1;
            let Some(decoded) = self.decoder.decode(&doc) else {
                self.stats.documents_skipped += 1;
                continue;
            };
            if self.query.accepts(&decoded) {
                self.buffer.push_back(self.decoder.project(&decoded, &self.output));
            } else {
                self.stats.rows_filtered += 1;
            }
        }
    }

    /// Up to `max` rows; an empty vector means the partition is exhausted
    ///
    /// A failure after some rows were gathered is reported by the next call,
    /// so rows read before it are never dropped.
    pub async fn next_rows(&mut self, max: usize) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while rows.len() < max {
            match self.next_row().await {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => break,
                Err(e) if rows.is_empty() => return Err(e),
                Err(e) => {
                    self.pending_error = Some(e);
                    break;
                }
            }
        }
        Ok(rows)
    }

    /// Read every remaining row
    pub async fn collect_rows(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Rows as a stream that ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<Row>> + Send {
        stream::try_unfold(self, |mut reader| async move {
            Ok(reader.next_row().await?.map(|row| (row, reader)))
        })
    }

    /// Rows grouped into Arrow batches of at most `batch_size` rows
    pub fn into_batches(self, batch_size: usize) -> impl Stream<Item = Result<RecordBatch>> + Send {
        let batch_size = batch_size.max(1);
        stream::try_unfold(self, move |mut reader| async move {
            let rows = reader.next_rows(batch_size).await?;
            if rows.is_empty() {
                return Ok(None);
            }
            let batch = rows_to_batch(&reader.output, &rows)?;
            Ok(Some((batch, reader)))
        })
    }
}

impl std::fmt::Debug for PartitionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionReader")
            .field("database", &self.database)
            .field("partition", &self.partition)
            .field("mode", &self.query.mode.name())
            .field("stats", &self.stats)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
