//! Request and response shapes for the document store endpoints

use crate::types::JsonValue;
use serde::{Deserialize, Serialize};

// ============================================================================
// Key ranges
// ============================================================================

/// Contiguous `_id` range in raw key order
///
/// `start` is always inclusive; `end` is inclusive only when `inclusive_end`
/// is set. Absent bounds are open.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(default)]
    pub inclusive_end: bool,
}

impl KeyRange {
    /// Unbounded range
    pub fn full() -> Self {
        Self::default()
    }

    /// Range `[start, end)`
    pub fn half_open(start: Option<String>, end: Option<String>) -> Self {
        Self {
            start,
            end,
            inclusive_end: false,
        }
    }

    /// Check whether no bounds are set
    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Check whether the range cannot contain any key
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => {
                if self.inclusive_end {
                    start > end
                } else {
                    start >= end
                }
            }
            _ => false,
        }
    }

    /// Check whether a key falls inside the range
    pub fn contains(&self, key: &str) -> bool {
        if let Some(start) = &self.start {
            if key < start.as_str() {
                return false;
            }
        }
        match &self.end {
            Some(end) if self.inclusive_end => key <= end.as_str(),
            Some(end) => key < end.as_str(),
            None => true,
        }
    }

    /// Intersect with another range
    #[must_use]
    pub fn intersect(&self, other: &KeyRange) -> KeyRange {
        let start = match (&self.start, &other.start) {
            (Some(a), Some(b)) => Some(a.max(b).clone()),
            (a, b) => a.clone().or_else(|| b.clone()),
        };

        let (end, inclusive_end) = match (&self.end, &other.end) {
            (Some(a), Some(b)) if a == b => (Some(a.clone()), self.inclusive_end && other.inclusive_end),
            (Some(a), Some(b)) if a < b => (Some(a.clone()), self.inclusive_end),
            (Some(_), Some(b)) => (Some(b.clone()), other.inclusive_end),
            (Some(a), None) => (Some(a.clone()), self.inclusive_end),
            (None, Some(b)) => (Some(b.clone()), other.inclusive_end),
            (None, None) => (None, false),
        };

        KeyRange {
            start,
            end,
            inclusive_end,
        }
    }

    /// Mango condition restricting `_id` to this range
    pub fn to_selector(&self) -> Option<JsonValue> {
        let mut condition = serde_json::Map::new();
        if let Some(start) = &self.start {
            condition.insert("$gte".to_string(), JsonValue::String(start.clone()));
        }
        if let Some(end) = &self.end {
            let op = if self.inclusive_end { "$lte" } else { "$lt" };
            condition.insert(op.to_string(), JsonValue::String(end.clone()));
        }
        if condition.is_empty() {
            None
        } else {
            Some(serde_json::json!({ "_id": condition }))
        }
    }
}

// ============================================================================
// Request parameters
// ============================================================================

/// Parameters for `_all_docs`
#[derive(Debug, Clone, Default)]
pub struct AllDocsQuery {
    pub range: KeyRange,
    /// Resume after this key (exclusive), overriding `range.start`
    pub after: Option<String>,
    pub skip: Option<u64>,
    pub limit: Option<usize>,
    pub include_docs: bool,
}

impl AllDocsQuery {
    /// Query string pairs; keys are JSON encoded as the store expects
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();

        match (&self.after, &self.range.start) {
            (Some(after), _) => {
                params.push(("startkey".to_string(), json_string(after)));
                params.push(("skip".to_string(), (self.skip.unwrap_or(0) + 1).to_string()));
            }
            (None, Some(start)) => {
                params.push(("startkey".to_string(), json_string(start)));
                if let Some(skip) = self.skip {
                    params.push(("skip".to_string(), skip.to_string()));
                }
            }
            (None, None) => {
                if let Some(skip) = self.skip {
                    params.push(("skip".to_string(), skip.to_string()));
                }
            }
        }

        if let Some(end) = &self.range.end {
            params.push(("endkey".to_string(), json_string(end)));
            params.push(("inclusive_end".to_string(), self.range.inclusive_end.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if self.include_docs {
            params.push(("include_docs".to_string(), "true".to_string()));
        }

        params
    }
}

/// Parameters for `_changes`
#[derive(Debug, Clone, Default)]
pub struct ChangesQuery {
    /// Sequence to resume from; `None` starts at the beginning
    pub since: Option<String>,
    pub limit: Option<usize>,
    pub include_docs: bool,
    /// Mango selector applied server-side through `filter=_selector`
    pub selector: Option<JsonValue>,
}

impl ChangesQuery {
    /// Query string pairs
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![(
            "since".to_string(),
            self.since.clone().unwrap_or_else(|| "0".to_string()),
        )];
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if self.include_docs {
            params.push(("include_docs".to_string(), "true".to_string()));
        }
        if self.selector.is_some() {
            params.push(("filter".to_string(), "_selector".to_string()));
        }
        params
    }
}

/// Parameters for a view or search request
#[derive(Debug, Clone, Default)]
pub struct IndexQuery {
    /// Parameters carried by the configured path suffix
    pub params: Vec<(String, String)>,
    pub skip: Option<u64>,
    pub limit: Option<usize>,
    pub bookmark: Option<String>,
    pub include_docs: bool,
}

impl IndexQuery {
    /// Query string pairs; explicit paging parameters replace suffix ones
    pub fn to_params(&self) -> Vec<(String, String)> {
        let paging = ["skip", "limit", "bookmark"];
        let mut params: Vec<(String, String)> = self
            .params
            .iter()
            .filter(|(k, _)| !paging.contains(&k.as_str()))
            .filter(|(k, _)| !(self.include_docs && k == "include_docs"))
            .cloned()
            .collect();

        if let Some(skip) = self.skip {
            params.push(("skip".to_string(), skip.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(bookmark) = &self.bookmark {
            params.push(("bookmark".to_string(), bookmark.clone()));
        }
        if self.include_docs {
            params.push(("include_docs".to_string(), "true".to_string()));
        }
        params
    }
}

/// Body of a `_find` request
#[derive(Debug, Clone, Default, Serialize)]
pub struct FindRequest {
    pub selector: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
}

fn json_string(s: &str) -> String {
    JsonValue::String(s.to_string()).to_string()
}

// ============================================================================
// Responses
// ============================================================================

/// `GET /`
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub couchdb: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub vendor: Option<JsonValue>,
}

/// `GET /{db}`
#[derive(Debug, Clone, Deserialize)]
pub struct DbInfo {
    pub db_name: String,
    #[serde(default)]
    pub doc_count: Option<u64>,
    #[serde(default)]
    pub doc_del_count: Option<u64>,
    #[serde(default)]
    pub update_seq: Option<JsonValue>,
}

/// `_all_docs` response
#[derive(Debug, Clone, Deserialize)]
pub struct AllDocsResponse {
    #[serde(default)]
    pub total_rows: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub rows: Vec<AllDocsRow>,
}

/// One `_all_docs` row
#[derive(Debug, Clone, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: JsonValue,
    #[serde(default)]
    pub value: Option<JsonValue>,
    #[serde(default)]
    pub doc: Option<JsonValue>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `_changes` response
#[derive(Debug, Clone, Deserialize)]
pub struct ChangesResponse {
    #[serde(default)]
    pub results: Vec<ChangeRow>,
    #[serde(default)]
    pub last_seq: JsonValue,
    #[serde(default)]
    pub pending: Option<u64>,
}

/// One change
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeRow {
    #[serde(default)]
    pub seq: JsonValue,
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub doc: Option<JsonValue>,
}

/// View response
#[derive(Debug, Clone, Deserialize)]
pub struct ViewResponse {
    #[serde(default)]
    pub total_rows: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub rows: Vec<ViewRow>,
}

/// One view row; reduced rows carry no `id`
#[derive(Debug, Clone, Deserialize)]
pub struct ViewRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: JsonValue,
    #[serde(default)]
    pub value: JsonValue,
    #[serde(default)]
    pub doc: Option<JsonValue>,
}

/// Search response
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub total_rows: Option<u64>,
    #[serde(default)]
    pub bookmark: Option<String>,
    #[serde(default)]
    pub rows: Vec<SearchRow>,
}

/// One search hit
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRow {
    pub id: String,
    #[serde(default)]
    pub fields: Option<JsonValue>,
    #[serde(default)]
    pub doc: Option<JsonValue>,
}

/// `_find` response
#[derive(Debug, Clone, Deserialize)]
pub struct FindResponse {
    #[serde(default)]
    pub docs: Vec<JsonValue>,
    #[serde(default)]
    pub bookmark: Option<String>,
    #[serde(default)]
    pub warning: Option<String>,
}

/// Per-document status from `_bulk_docs`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BulkDocResult {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub rev: Option<String>,
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl BulkDocResult {
    /// Check whether the document was stored
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Check whether the failure is a revision conflict
    pub fn is_conflict(&self) -> bool {
        self.error.as_deref() == Some("conflict")
    }
}

/// Render a sequence token (string on clusters, integer on single nodes)
pub fn seq_to_string(seq: &JsonValue) -> Option<String> {
    match seq {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
