//! Pagination module
//!
//! Supports: Key cursor (`_all_docs`), Bookmark (`_find`, search), Sequence
//! (`_changes`), Skip/limit (views)
//!
//! # Overview
//!
//! Every access mode of the store pages differently. A [`Paginator`] hides
//! the difference behind one call that returns the next page of documents
//! and tracks when the partition is exhausted.

mod strategies;
mod types;

pub use strategies::{
    paginator_for, view_row_document, AllDocsPaginator, ChangesPaginator, FindPaginator,
    RowWindow, SearchPaginator, ViewPaginator,
};
pub use types::{NextPage, PaginationState, Paginator};
