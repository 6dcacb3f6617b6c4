//! Reader settings and counters

use crate::config::{ReadOptions, DEFAULT_PAGE_SIZE};

/// Per-partition reader settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Rows requested per store call
    pub page_size: usize,
    /// Decode nested objects as dotted columns
    pub flatten: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            flatten: false,
        }
    }
}

impl From<&ReadOptions> for ReaderOptions {
    fn from(options: &ReadOptions) -> Self {
        Self {
            page_size: options.page_size,
            flatten: options.flatten,
        }
    }
}

/// Counters for one partition read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Pages fetched from the store
    pub pages_fetched: usize,
    /// Documents returned by the store
    pub documents_seen: usize,
    /// Tombstones, design documents and non-objects
    pub documents_skipped: usize,
    /// Decoded rows rejected by a filter
    pub rows_filtered: usize,
    /// Rows handed to the caller
    pub rows_emitted: usize,
}
