//! Pagination strategy implementations
//!
//! Each strategy pages through one access mode of the store.

use super::types::{NextPage, PaginationState, Paginator};
use crate::config::MAX_SEARCH_PAGE_SIZE;
use crate::error::Result;
use crate::partition::PartitionScope;
use crate::query::{AccessMode, TranslatedQuery};
use crate::store::{
    seq_to_string, AllDocsQuery, ChangesQuery, CouchClient, FindRequest, IndexQuery, KeyRange,
    SearchRow, ViewRow,
};
use crate::types::{JsonObject, JsonValue, ID_FIELD};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

/// Build the paginator for one partition of a translated query
pub fn paginator_for(
    query: &TranslatedQuery,
    scope: &PartitionScope,
    page_size: usize,
) -> Box<dyn Paginator> {
    let page_size = page_size.max(1);
    match &query.mode {
        AccessMode::AllDocs => {
            let range = scope
                .key_range()
                .cloned()
                .unwrap_or_else(|| query.key_range.clone());
            Box::new(AllDocsPaginator::new(range, page_size))
        }
        AccessMode::Changes => {
            let since = match scope {
                PartitionScope::Sequence { since } => since.clone(),
                _ => None,
            };
            Box::new(ChangesPaginator::new(query.selector.clone(), since, page_size))
        }
        AccessMode::Selector => {
            let selector = query
                .selector
                .clone()
                .unwrap_or_else(|| json!({ ID_FIELD: { "$gt": null } }));
            Box::new(FindPaginator::new(selector, query.fields.clone(), page_size))
        }
        AccessMode::View { path, params } => {
            Box::new(ViewPaginator::new(path.clone(), params.clone(), page_size))
        }
        AccessMode::Search { path, params } => {
            Box::new(SearchPaginator::new(path.clone(), params.clone(), page_size))
        }
    }
}

// ============================================================================
// All docs
// ============================================================================

/// Key-cursor paging over `_all_docs`
///
/// Each page resumes after the last key of the previous one; a short page
/// means the range is exhausted.
#[derive(Debug, Clone)]
pub struct AllDocsPaginator {
    range: KeyRange,
    page_size: usize,
    state: PaginationState,
}

impl AllDocsPaginator {
    /// Create a paginator over a key range
    pub fn new(range: KeyRange, page_size: usize) -> Self {
        Self {
            range,
            page_size,
            state: PaginationState::new(),
        }
    }
}

#[async_trait]
impl Paginator for AllDocsPaginator {
    async fn next_page(&mut self, client: &CouchClient, database: &str) -> Result<NextPage> {
        if self.state.done {
            return Ok(NextPage::Done);
        }

        let query = AllDocsQuery {
            range: self.range.clone(),
            after: self.state.cursor.clone(),
            skip: None,
            limit: Some(self.page_size),
            include_docs: true,
        };
        let response = client.all_docs(database, &query).await?;
        let rows = response.rows.len();
        self.state.record_page(rows);
        debug!(
            "_all_docs page {} of {database}: {rows} row(s) after {:?}",
            self.state.pages, self.state.cursor
        );

        if rows < self.page_size {
            self.state.mark_done();
        }
        if let Some(last) = response.rows.last().and_then(|r| r.id.clone()) {
            self.state.set_cursor(last);
        } else {
            self.state.mark_done();
        }
        if rows == 0 {
            return Ok(NextPage::Done);
        }

        Ok(NextPage::Docs(
            response
                .rows
                .into_iter()
                .filter(|r| r.error.is_none())
                .filter_map(|r| r.doc)
                .collect(),
        ))
    }

    fn state(&self) -> &PaginationState {
        &self.state
    }
}

// ============================================================================
// Mango _find
// ============================================================================

/// Bookmark paging over `_find`
#[derive(Debug, Clone)]
pub struct FindPaginator {
    selector: JsonValue,
    fields: Option<Vec<String>>,
    page_size: usize,
    state: PaginationState,
}

impl FindPaginator {
    /// Create a paginator for a selector
    pub fn new(selector: JsonValue, fields: Option<Vec<String>>, page_size: usize) -> Self {
        Self {
            selector,
            fields,
            page_size,
            state: PaginationState::new(),
        }
    }
}

#[async_trait]
impl Paginator for FindPaginator {
    async fn next_page(&mut self, client: &CouchClient, database: &str) -> Result<NextPage> {
        if self.state.done {
            return Ok(NextPage::Done);
        }

        let request = FindRequest {
            selector: self.selector.clone(),
            fields: self.fields.clone(),
            limit: Some(self.page_size),
            bookmark: self.state.cursor.clone(),
        };
        let response = client.find(database, &request).await?;
        let rows = response.docs.len();
        self.state.record_page(rows);
        debug!("_find page {} of {database}: {rows} doc(s)", self.state.pages);

        match response.bookmark {
            Some(bookmark) if rows == self.page_size && self.state.cursor.as_ref() != Some(&bookmark) => {
                self.state.set_cursor(bookmark);
            }
            _ => self.state.mark_done(),
        }
        if rows == 0 {
            return Ok(NextPage::Done);
        }
        Ok(NextPage::Docs(response.docs))
    }

    fn state(&self) -> &PaginationState {
        &self.state
    }
}

// ============================================================================
// Changes feed
// ============================================================================

/// Sequence paging over `_changes`
#[derive(Debug, Clone)]
pub struct ChangesPaginator {
    selector: Option<JsonValue>,
    page_size: usize,
    state: PaginationState,
}

impl ChangesPaginator {
    /// Create a paginator starting after `since` (`None` = from the beginning)
    pub fn new(selector: Option<JsonValue>, since: Option<String>, page_size: usize) -> Self {
        Self {
            selector,
            page_size,
            state: PaginationState {
                cursor: since,
                ..PaginationState::new()
            },
        }
    }
}

#[async_trait]
impl Paginator for ChangesPaginator {
    async fn next_page(&mut self, client: &CouchClient, database: &str) -> Result<NextPage> {
        if self.state.done {
            return Ok(NextPage::Done);
        }

        let query = ChangesQuery {
            since: self.state.cursor.clone(),
            limit: Some(self.page_size),
            include_docs: true,
            selector: self.selector.clone(),
        };
        let response = client.changes(database, &query).await?;
        let rows = response.results.len();
        self.state.record_page(rows);
        debug!(
            "_changes page {} of {database}: {rows} change(s), pending {:?}",
            self.state.pages, response.pending
        );

        if rows < self.page_size || response.pending == Some(0) {
            self.state.mark_done();
        }
        match seq_to_string(&response.last_seq) {
            Some(seq) => self.state.set_cursor(seq),
            None => self.state.mark_done(),
        }
        if rows == 0 {
            return Ok(NextPage::Done);
        }

        Ok(NextPage::Docs(
            response
                .results
                .into_iter()
                .filter(|change| !change.deleted)
                .filter_map(|change| change.doc)
                .collect(),
        ))
    }

    fn state(&self) -> &PaginationState {
        &self.state
    }
}

// ============================================================================
// Views
// ============================================================================

/// `skip`/`limit` given in a view or search path suffix
///
/// They describe the rows the caller wants as a whole, so they are taken out
/// of the per-page parameters and applied across pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowWindow {
    /// Rows to pass over before the first one returned
    pub skip: u64,
    /// Most rows to return in total
    pub limit: Option<usize>,
}

impl RowWindow {
    /// Remove `skip`/`limit` from `params` and return them
    pub fn take_from(params: &mut Vec<(String, String)>) -> Self {
        let mut window = Self::default();
        params.retain(|(key, value)| {
            let parsed = match key.as_str() {
                "skip" => value.parse().map(|skip| window.skip = skip).is_ok(),
                "limit" => value.parse().map(|limit| window.limit = Some(limit)).is_ok(),
                _ => return true,
            };
            if !parsed {
                warn!("Ignoring non-numeric {key}={value} in index path");
            }
            false
        });
        window
    }
}

/// Skip/limit paging over a view
#[derive(Debug, Clone)]
pub struct ViewPaginator {
    path: String,
    params: Vec<(String, String)>,
    page_size: usize,
    skip: u64,
    remaining: Option<usize>,
    state: PaginationState,
}

impl ViewPaginator {
    /// Create a paginator for a view path and its fixed parameters
    pub fn new(path: String, mut params: Vec<(String, String)>, page_size: usize) -> Self {
        let window = RowWindow::take_from(&mut params);
        Self {
            path,
            params,
            page_size,
            skip: window.skip,
            remaining: window.limit,
            state: PaginationState::new(),
        }
    }
}

#[async_trait]
impl Paginator for ViewPaginator {
    async fn next_page(&mut self, client: &CouchClient, database: &str) -> Result<NextPage> {
        if self.remaining == Some(0) {
            self.state.mark_done();
        }
        if self.state.done {
            return Ok(NextPage::Done);
        }

        let limit = self.remaining.map_or(self.page_size, |r| r.min(self.page_size));
        let query = IndexQuery {
            params: self.params.clone(),
            skip: (self.skip > 0).then_some(self.skip),
            limit: Some(limit),
            bookmark: None,
            include_docs: false,
        };
        let response = client.view(database, &self.path, &query).await?;
        let rows = response.rows.len();
        self.state.record_page(rows);
        debug!("View {} page {}: {rows} row(s)", self.path, self.state.pages);

        self.skip += rows as u64;
        self.state.set_cursor(self.skip.to_string());
        if let Some(remaining) = &mut self.remaining {
            *remaining = remaining.saturating_sub(rows);
        }
        if rows < limit || self.remaining == Some(0) {
            self.state.mark_done();
        }
        if rows == 0 {
            return Ok(NextPage::Done);
        }

        Ok(NextPage::Docs(
            response.rows.into_iter().map(view_row_document).collect(),
        ))
    }

    fn state(&self) -> &PaginationState {
        &self.state
    }
}

/// Document for a view row: the embedded doc, else `{_id?, key, value}`
pub fn view_row_document(row: ViewRow) -> JsonValue {
    if let Some(doc @ JsonValue::Object(_)) = row.doc {
        return doc;
    }
    let mut out = JsonObject::new();
    if let Some(id) = row.id {
        out.insert(ID_FIELD.to_string(), JsonValue::String(id));
    }
    out.insert("key".to_string(), row.key);
    out.insert("value".to_string(), row.value);
    JsonValue::Object(out)
}

// ============================================================================
// Search indexes
// ============================================================================

/// Bookmark paging over a search index
///
/// Search has no server-side offset, so a suffix `skip` drops leading hits
/// client-side.
#[derive(Debug, Clone)]
pub struct SearchPaginator {
    path: String,
    params: Vec<(String, String)>,
    limit: usize,
    to_skip: u64,
    remaining: Option<usize>,
    state: PaginationState,
}

impl SearchPaginator {
    /// Create a paginator; the page size is capped at the store maximum
    pub fn new(path: String, mut params: Vec<(String, String)>, page_size: usize) -> Self {
        let window = RowWindow::take_from(&mut params);
        Self {
            path,
            params,
            limit: page_size.min(MAX_SEARCH_PAGE_SIZE),
            to_skip: window.skip,
            remaining: window.limit,
            state: PaginationState::new(),
        }
    }
}

#[async_trait]
impl Paginator for SearchPaginator {
    async fn next_page(&mut self, client: &CouchClient, database: &str) -> Result<NextPage> {
        if self.remaining == Some(0) {
            self.state.mark_done();
        }
        if self.state.done {
            return Ok(NextPage::Done);
        }

        let query = IndexQuery {
            params: self.params.clone(),
            skip: None,
            limit: Some(self.limit),
            bookmark: self.state.cursor.clone(),
            include_docs: true,
        };
        let response = client.search(database, &self.path, &query).await?;
        let rows = response.rows.len();
        self.state.record_page(rows);
        debug!("Search {} page {}: {rows} hit(s)", self.path, self.state.pages);

        match response.bookmark {
            Some(bookmark) if rows == self.limit && self.state.cursor.as_ref() != Some(&bookmark) => {
                self.state.set_cursor(bookmark);
            }
            _ => self.state.mark_done(),
        }
        if rows == 0 {
            return Ok(NextPage::Done);
        }

        let skipped = (self.to_skip as usize).min(rows);
        self.to_skip -= skipped as u64;
        let mut hits: Vec<JsonValue> = response
            .rows
            .into_iter()
            .skip(skipped)
            .map(search_row_document)
            .collect();
        if let Some(remaining) = &mut self.remaining {
            hits.truncate(*remaining);
            *remaining -= hits.len();
            if *remaining == 0 {
                self.state.mark_done();
            }
        }

        Ok(NextPage::Docs(hits))
    }

    fn state(&self) -> &PaginationState {
        &self.state
    }
}

/// Document for a search hit: the embedded doc, else its stored fields
fn search_row_document(row: SearchRow) -> JsonValue {
    if let Some(doc @ JsonValue::Object(_)) = row.doc {
        return doc;
    }
    let mut out = match row.fields {
        Some(JsonValue::Object(fields)) => fields,
        _ => JsonObject::new(),
    };
    out.insert(ID_FIELD.to_string(), JsonValue::String(row.id));
    JsonValue::Object(out)
}
