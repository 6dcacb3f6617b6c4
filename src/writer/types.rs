//! Write batches and summaries

use crate::error::{DocumentFailure, Error, Result};
use crate::types::JsonValue;

/// Documents pending one bulk call
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    docs: Vec<JsonValue>,
    capacity: usize,
}

impl WriteBatch {
    /// Empty batch holding at most `capacity` documents
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            docs: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a document; returns `true` once the batch is full
    pub fn push(&mut self, doc: JsonValue) -> bool {
        self.docs.push(doc);
        self.is_full()
    }

    /// Check whether the batch reached its capacity
    pub fn is_full(&self) -> bool {
        self.docs.len() >= self.capacity
    }

    /// Number of pending documents
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Check for an empty batch
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Take the pending documents, leaving the batch empty
    pub fn take(&mut self) -> Vec<JsonValue> {
        std::mem::replace(&mut self.docs, Vec::with_capacity(self.capacity))
    }
}

/// Outcome of a write operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Documents the store accepted
    pub written: usize,
    /// Bulk calls issued
    pub batches: usize,
    /// Documents that failed to persist
    pub failures: Vec<DocumentFailure>,
}

impl WriteSummary {
    /// Create an empty summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold another summary into this one
    pub fn merge(&mut self, other: WriteSummary) {
        self.written += other.written;
        self.batches += other.batches;
        self.failures.extend(other.failures);
    }

    /// Check whether every document was written
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// The summary, or [`Error::Write`] listing every failed document
    pub fn into_result(self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(Error::Write {
                failures: self.failures,
            })
        }
    }
}
