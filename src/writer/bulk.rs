//! Bulk document writer

use super::types::{WriteBatch, WriteSummary};
use crate::config::{ConflictPolicy, WriteOptions};
use crate::error::{DocumentFailure, Error, Result};
use crate::output::arrow_to_json;
use crate::store::{BulkDocResult, CouchClient};
use crate::types::{JsonValue, ID_FIELD, REV_FIELD};
use arrow::record_batch::RecordBatch;
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, info, warn};

/// Buffers rows into bulk calls against one database
///
/// Documents are flushed whenever a batch reaches the configured bulk size;
/// [`RowWriter::finish`] flushes the remainder. Per-document failures are
/// collected in the summary, while transport failures abort the write.
/// Batches already flushed stay written.
#[derive(Debug)]
pub struct RowWriter {
    client: CouchClient,
    database: String,
    conflict_policy: ConflictPolicy,
    batch: WriteBatch,
    summary: WriteSummary,
    /// Still has to create the database before the first bulk call
    create_pending: bool,
}

impl RowWriter {
    /// Create a writer for a database
    pub fn new(client: CouchClient, database: impl Into<String>, options: &WriteOptions) -> Self {
        Self {
            client,
            database: database.into(),
            conflict_policy: options.conflict_policy,
            batch: WriteBatch::new(options.bulk_size),
            summary: WriteSummary::new(),
            create_pending: options.create_db_on_save,
        }
    }

    fn database_ready(mut self) -> Self {
        self.create_pending = false;
        self
    }

    /// Target database
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Progress so far
    pub fn summary(&self) -> &WriteSummary {
        &self.summary
    }

    /// Queue one document, flushing when the batch is full
    pub async fn write(&mut self, doc: JsonValue) -> Result<()> {
        if self.batch.push(doc) {
            self.flush().await?;
        }
        Ok(())
    }

    /// Queue every document of an iterator
    pub async fn write_all<I>(&mut self, docs: I) -> Result<()>
    where
        I: IntoIterator<Item = JsonValue>,
    {
        for doc in docs {
            self.write(doc).await?;
        }
        Ok(())
    }

    /// Queue the rows of an Arrow batch as documents
    pub async fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        self.write_all(arrow_to_json(batch)?).await
    }

    /// Queue every document of a stream; the first stream error aborts
    pub async fn write_stream<S>(&mut self, docs: S) -> Result<()>
    where
        S: Stream<Item = Result<JsonValue>>,
    {
        futures::pin_mut!(docs);
        while let Some(doc) = docs.next().await {
            self.write(doc?).await?;
        }
        Ok(())
    }

    /// Send the pending batch
    pub async fn flush(&mut self) -> Result<()> {
        let docs = self.batch.take();
        if docs.is_empty() {
            return Ok(());
        }
        if self.create_pending {
            ensure_database(&self.client, &self.database).await;
            self.create_pending = false;
        }

        let outcome = self.submit(docs).await?;
        debug!(
            "Flushed batch to {}: {} written, {} failed",
            self.database,
            outcome.written,
            outcome.failures.len()
        );
        self.summary.merge(outcome);
        Ok(())
    }

    /// Flush and return the summary, failed documents included
    pub async fn close(mut self) -> Result<WriteSummary> {
        self.flush().await?;
        Ok(self.summary)
    }

    /// Flush and fail with [`Error::Write`] if any document failed
    pub async fn finish(self) -> Result<WriteSummary> {
        self.close().await?.into_result()
    }

    async fn submit(&self, docs: Vec<JsonValue>) -> Result<WriteSummary> {
        let mut summary = WriteSummary::new();
        let mut payload = Vec::with_capacity(docs.len());
        for doc in docs {
            match prepare_document(doc) {
                Ok(doc) => payload.push(doc),
                Err(failure) => summary.failures.push(failure),
            }
        }
        if payload.is_empty() {
            return Ok(summary);
        }

        let results = self.bulk(&payload).await?;
        summary.batches += 1;

        let mut conflicts = Vec::new();
        for (doc, result) in payload.into_iter().zip(results) {
            if result.is_ok() {
                summary.written += 1;
            } else if result.is_conflict() && self.conflict_policy == ConflictPolicy::Overwrite {
                conflicts.push(doc);
            } else {
                summary.failures.push(failure(&doc, &result));
            }
        }

        if !conflicts.is_empty() {
            summary.merge(self.overwrite(conflicts).await?);
        }
        Ok(summary)
    }

    /// Resubmit conflicted documents once at their current revisions
    async fn overwrite(&self, docs: Vec<JsonValue>) -> Result<WriteSummary> {
        warn!(
            "{} conflict(s) in {}; resubmitting at current revisions",
            docs.len(),
            self.database
        );
        let ids: Vec<String> = docs.iter().filter_map(document_id).collect();
        let revisions = self.client.fetch_revisions(&self.database, &ids).await?;

        let mut summary = WriteSummary::new();
        let mut retry = Vec::with_capacity(docs.len());
        for mut doc in docs {
            let rev = document_id(&doc).and_then(|id| revisions.get(&id).cloned());
            match (rev, doc.as_object_mut()) {
                (Some(rev), Some(obj)) => {
                    obj.insert(REV_FIELD.to_string(), JsonValue::String(rev));
                    retry.push(doc);
                }
                _ => summary.failures.push(DocumentFailure {
                    id: document_id(&doc),
                    error: "conflict".to_string(),
                    reason: "no current revision to overwrite".to_string(),
                }),
            }
        }
        if retry.is_empty() {
            return Ok(summary);
        }

        let results = self.bulk(&retry).await?;
        summary.batches += 1;
        for (doc, result) in retry.iter().zip(results) {
            if result.is_ok() {
                summary.written += 1;
            } else {
                summary.failures.push(failure(doc, &result));
            }
        }
        Ok(summary)
    }

    async fn bulk(&self, docs: &[JsonValue]) -> Result<Vec<BulkDocResult>> {
        let results = self.client.bulk_docs(&self.database, docs).await?;
        if results.len() != docs.len() {
            return Err(Error::decode(format!(
                "_bulk_docs returned {} result(s) for {} document(s)",
                results.len(),
                docs.len()
            )));
        }
        Ok(results)
    }
}

/// Write independent partitions of documents concurrently
///
/// The database is created once up front when `create_db_on_save` is set.
/// Each partition gets its own writer and runs to completion or to its
/// first transport error; summaries are merged. A transport error fails the
/// operation with [`Error::WriteAborted`], which still reports what the
/// other partitions stored. Otherwise any failed document fails it with
/// [`Error::Write`].
pub async fn write_partitions<P>(
    client: &CouchClient,
    database: &str,
    options: &WriteOptions,
    partitions: P,
    concurrency: usize,
) -> Result<WriteSummary>
where
    P: IntoIterator<Item = Vec<JsonValue>>,
{
    if options.create_db_on_save {
        ensure_database(client, database).await;
    }

    let (summary, error) = stream::iter(partitions)
        .enumerate()
        .map(|(index, docs)| {
            let mut writer = RowWriter::new(client.clone(), database, options).database_ready();
            async move {
                let count = docs.len();
                let result = match writer.write_all(docs).await {
                    Ok(()) => writer.flush().await,
                    Err(e) => Err(e),
                };
                let summary = std::mem::take(&mut writer.summary);
                match &result {
                    Ok(()) => debug!("Partition {index}: wrote {} of {count} document(s)", summary.written),
                    Err(e) => warn!(
                        "Partition {index} stopped after {} of {count} document(s): {e}",
                        summary.written
                    ),
                }
                (summary, result)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .fold(
            (WriteSummary::new(), None::<Error>),
            |(mut acc, mut error), (summary, result)| {
                acc.merge(summary);
                if let Err(e) = result {
                    error.get_or_insert(e);
                }
                future::ready((acc, error))
            },
        )
        .await;

    info!(
        "Wrote {} document(s) to {database} in {} batch(es), {} failed",
        summary.written,
        summary.batches,
        summary.failures.len()
    );
    if let Some(source) = error {
        return Err(Error::WriteAborted {
            written: summary.written,
            failures: summary.failures,
            source: Box::new(source),
        });
    }
    summary.into_result()
}

/// Create the database, tolerating any failure
///
/// An existing database (412) or a creation race is not an error; a real
/// problem surfaces on the bulk call that follows.
async fn ensure_database(client: &CouchClient, database: &str) {
    if let Err(e) = client.create_database(database).await {
        warn!("Could not create database {database}: {e}");
    }
}

/// Drop null identifiers so the store assigns them
pub fn prepare_document(doc: JsonValue) -> std::result::Result<JsonValue, DocumentFailure> {
    match doc {
        JsonValue::Object(mut obj) => {
            for key in [ID_FIELD, REV_FIELD] {
                if obj.get(key).is_some_and(JsonValue::is_null) {
                    obj.remove(key);
                }
            }
            Ok(JsonValue::Object(obj))
        }
        other => Err(DocumentFailure {
            id: None,
            error: "bad_request".to_string(),
            reason: format!("document must be a JSON object, got {other}"),
        }),
    }
}

fn document_id(doc: &JsonValue) -> Option<String> {
    doc.get(ID_FIELD)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
}

fn failure(doc: &JsonValue, result: &BulkDocResult) -> DocumentFailure {
    DocumentFailure {
        id: result.id.clone().or_else(|| document_id(doc)),
        error: result.error.clone().unwrap_or_else(|| "unknown_error".to_string()),
        reason: result.reason.clone().unwrap_or_default(),
    }
}
