//! Pagination types and traits
//!
//! Defines the core pagination abstractions used by all access modes.

use crate::error::Result;
use crate::store::CouchClient;
use crate::types::JsonValue;
use async_trait::async_trait;

/// Result of fetching one page
#[derive(Debug, Clone, PartialEq)]
pub enum NextPage {
    /// Documents from this page; more pages may follow
    Docs(Vec<JsonValue>),
    /// No more pages
    Done,
}

impl NextPage {
    /// Check if this is a done result
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Documents of the page, if any
    pub fn into_docs(self) -> Option<Vec<JsonValue>> {
        match self {
            Self::Docs(docs) => Some(docs),
            Self::Done => None,
        }
    }
}

/// Tracks pagination progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationState {
    /// Pages fetched so far
    pub pages: u32,
    /// Rows returned by the store so far (before any filtering)
    pub total_fetched: u64,
    /// Opaque resume token (last key, bookmark or sequence)
    pub cursor: Option<String>,
    /// Is pagination complete?
    pub done: bool,
}

impl PaginationState {
    /// Create a new pagination state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fetched page of `rows` rows
    pub fn record_page(&mut self, rows: usize) {
        self.pages += 1;
        self.total_fetched += rows as u64;
    }

    /// Set cursor
    pub fn set_cursor(&mut self, cursor: String) {
        self.cursor = Some(cursor);
    }

    /// Mark pagination as complete
    pub fn mark_done(&mut self) {
        self.done = true;
    }
}

/// Core trait for paging through one access mode
///
/// A paginator is single-pass: once it reports [`NextPage::Done`] every
/// further call does too.
#[async_trait]
pub trait Paginator: Send + Sync {
    /// Fetch the next page of documents
    async fn next_page(&mut self, client: &CouchClient, database: &str) -> Result<NextPage>;

    /// Progress so far
    fn state(&self) -> &PaginationState;
}
