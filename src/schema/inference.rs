//! Schema inference from sampled documents

use super::types::Schema;
use crate::error::{Error, Result};
use crate::types::{is_deleted, is_design_doc_id, JsonValue, ID_FIELD};
use futures::{Stream, StreamExt};
use tracing::debug;

/// Accumulates the schema of sampled documents
#[derive(Debug, Clone, Default)]
pub struct SchemaInferrer {
    /// Flatten nested objects into dotted columns
    flatten: bool,
    /// Stop after this many documents (`None` = no limit)
    sample_size: Option<usize>,
    /// Documents merged so far
    sampled: usize,
    /// Documents rejected (tombstones, design documents, non-objects)
    skipped: usize,
    /// Join of every sampled document; `None` until the first one
    schema: Option<Schema>,
}

impl SchemaInferrer {
    /// Create an inferrer with no sample limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of sampled documents
    #[must_use]
    pub fn with_sample_size(mut self, sample_size: Option<usize>) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Enable flattening of nested objects
    #[must_use]
    pub fn with_flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    /// Number of documents merged so far
    pub fn sampled(&self) -> usize {
        self.sampled
    }

    /// Check whether the sample limit has been reached
    pub fn is_full(&self) -> bool {
        self.sample_size.is_some_and(|limit| self.sampled >= limit)
    }

    /// Merge one document; returns false if it was not eligible
    pub fn observe(&mut self, doc: &JsonValue) -> bool {
        if self.is_full() {
            return false;
        }

        let Some(map) = doc.as_object() else {
            self.skipped += 1;
            return false;
        };

        let design = map
            .get(ID_FIELD)
            .and_then(JsonValue::as_str)
            .is_some_and(is_design_doc_id);
        if design || is_deleted(doc) {
            self.skipped += 1;
            return false;
        }

        let observed = Schema::from_document(map);
        self.schema = Some(match self.schema.take() {
            Some(schema) => schema.merge(&observed),
            None => observed,
        });
        self.sampled += 1;
        true
    }

    /// Produce the schema; fails if nothing eligible was sampled
    pub fn finish(self) -> Result<Schema> {
        let Some(schema) = self.schema else {
            return Err(Error::schema_inference(format!(
                "no documents available to infer a schema ({} skipped)",
                self.skipped
            )));
        };

        debug!(
            "Inferred {} column(s) from {} document(s), {} skipped",
            schema.len(),
            self.sampled,
            self.skipped
        );

        Ok(if self.flatten { schema.flatten() } else { schema })
    }

    /// Infer from an in-memory sample
    pub fn infer_from_documents<'a, I>(mut self, docs: I) -> Result<Schema>
    where
        I: IntoIterator<Item = &'a JsonValue>,
    {
        for doc in docs {
            if self.is_full() {
                break;
            }
            self.observe(doc);
        }
        self.finish()
    }

    /// Infer from a document stream, stopping as soon as the sample is full
    pub async fn infer_from_stream<S>(mut self, docs: S) -> Result<Schema>
    where
        S: Stream<Item = Result<JsonValue>>,
    {
        futures::pin_mut!(docs);
        while let Some(doc) = docs.next().await {
            self.observe(&doc?);
            if self.is_full() {
                break;
            }
        }
        self.finish()
    }
}

/// Infer a schema from documents with default settings
pub fn infer_schema<'a, I>(docs: I) -> Result<Schema>
where
    I: IntoIterator<Item = &'a JsonValue>,
{
    SchemaInferrer::new().infer_from_documents(docs)
}

/// Merge two schemas
pub fn merge_schemas(a: &Schema, b: &Schema) -> Schema {
    a.merge(b)
}
