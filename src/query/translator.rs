//! Query translation
//!
//! Resolves a [`QueryDescriptor`] into the store-native request for one
//! access mode. Precedence: `view` > `index` > selector/filters > plain
//! `_all_docs`/`_changes` scan.

use super::filter::Filter;
use crate::config::{Endpoint, ReadOptions};
use crate::error::{Error, Result};
use crate::schema::{FieldType, Schema};
use crate::store::KeyRange;
use crate::types::{JsonValue, ID_FIELD, REV_FIELD};
use serde_json::json;
use tracing::{debug, warn};

/// Default query for a search index without an explicit `q`
pub const MATCH_ALL_QUERY: &str = "*:*";

/// How documents are fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessMode {
    /// Key-ordered `_all_docs` scan
    AllDocs,
    /// Sequence-ordered changes feed
    Changes,
    /// Mango `_find`
    Selector,
    /// Design document view
    View {
        path: String,
        params: Vec<(String, String)>,
    },
    /// Search index
    Search {
        path: String,
        params: Vec<(String, String)>,
    },
}

impl AccessMode {
    /// Short mode name for logs
    pub fn name(&self) -> &'static str {
        match self {
            AccessMode::AllDocs => "all_docs",
            AccessMode::Changes => "changes",
            AccessMode::Selector => "selector",
            AccessMode::View { .. } => "view",
            AccessMode::Search { .. } => "search",
        }
    }
}

/// Requested read, before translation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryDescriptor {
    /// View path, optionally with a query-string suffix
    pub view: Option<String>,
    /// Search index path, optionally with a query-string suffix
    pub index: Option<String>,
    /// Raw Mango selector JSON
    pub selector: Option<String>,
    /// Scan endpoint when no view, index or selector applies
    pub endpoint: Endpoint,
    /// Predicates from the host engine (implicitly AND-ed)
    pub filters: Vec<Filter>,
    /// Requested columns (`None` = all)
    pub columns: Option<Vec<String>>,
}

impl QueryDescriptor {
    /// Unfiltered scan of an endpoint
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    /// Descriptor from read options; `default_endpoint` applies when none is set
    pub fn from_options(options: &ReadOptions, default_endpoint: Endpoint) -> Self {
        Self {
            view: options.view.clone(),
            index: options.index.clone(),
            selector: options.selector.clone(),
            endpoint: options.endpoint.unwrap_or(default_endpoint),
            filters: Vec::new(),
            columns: None,
        }
    }

    /// Attach predicates
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    /// Restrict output columns
    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

/// Store-native form of a read
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedQuery {
    pub mode: AccessMode,
    /// Mango selector for `_find` or `_changes?filter=_selector`
    pub selector: Option<JsonValue>,
    /// `_id` bounds for key-ordered scans
    pub key_range: KeyRange,
    /// Field projection sent with `_find`
    pub fields: Option<Vec<String>>,
    /// Output columns (`None` = all schema columns)
    pub columns: Option<Vec<String>>,
    /// Every predicate; the reader evaluates all of them on decoded rows
    pub filters: Vec<Filter>,
    /// Predicates handled by the store request
    pub pushed: Vec<Filter>,
    /// Predicates the store request does not handle
    pub residual: Vec<Filter>,
}

impl TranslatedQuery {
    /// Check whether the query provably matches nothing
    pub fn is_empty(&self) -> bool {
        self.key_range.is_empty()
    }

    /// Schema of emitted rows
    pub fn output_schema(&self, schema: &Schema) -> Schema {
        match &self.columns {
            None => schema.clone(),
            Some(columns) => Schema::new(
                columns
                    .iter()
                    .filter_map(|c| schema.field(c).cloned())
                    .collect(),
            ),
        }
    }

    /// Check a decoded row against every predicate
    pub fn accepts(&self, row: &crate::types::JsonObject) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }
}

/// Translates descriptors against a fixed schema
#[derive(Debug, Clone, Copy)]
pub struct QueryTranslator<'a> {
    schema: &'a Schema,
}

impl<'a> QueryTranslator<'a> {
    /// Create a translator for a schema
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Translate a descriptor
    pub fn translate(&self, descriptor: &QueryDescriptor) -> Result<TranslatedQuery> {
        if let Some(columns) = &descriptor.columns {
            for column in columns {
                if self.schema.field(column).is_none() {
                    return Err(Error::query_translation(format!(
                        "unknown column '{column}'"
                    )));
                }
            }
        }

        let conjuncts: Vec<Filter> = descriptor
            .filters
            .iter()
            .flat_map(split_conjunction)
            .collect();

        let translated = if let Some(view) = &descriptor.view {
            if descriptor.index.is_some() || descriptor.selector.is_some() {
                warn!("'view' takes precedence; ignoring 'index' and 'selector'");
            }
            let (path, params) = split_path(view)?;
            self.client_side(AccessMode::View { path, params }, descriptor, conjuncts)
        } else if let Some(index) = &descriptor.index {
            if descriptor.selector.is_some() {
                warn!("'index' takes precedence; ignoring 'selector'");
            }
            let (path, mut params) = split_path(index)?;
            if !params.iter().any(|(k, _)| k == "q" || k == "query") {
                params.push(("q".to_string(), MATCH_ALL_QUERY.to_string()));
            }
            self.client_side(AccessMode::Search { path, params }, descriptor, conjuncts)
        } else {
            let user_selector = descriptor
                .selector
                .as_deref()
                .map(parse_selector)
                .transpose()?;
            match descriptor.endpoint {
                Endpoint::Changes => self.changes(descriptor, user_selector, conjuncts),
                Endpoint::AllDocs => self.all_docs(descriptor, user_selector, conjuncts),
            }
        };

        debug!(
            "Translated query: mode={}, pushed={}, residual={}",
            translated.mode.name(),
            translated.pushed.len(),
            translated.residual.len()
        );
        Ok(translated)
    }

    /// Check whether a predicate can be sent to Mango without losing rows
    pub fn is_pushable(&self, filter: &Filter) -> bool {
        match filter {
            Filter::And(a, b) | Filter::Or(a, b) => self.is_pushable(a) && self.is_pushable(b),
            Filter::Not(_) | Filter::EqualNullSafe(..) => false,
            leaf => {
                let Some(field_type) = leaf.column().and_then(|c| self.top_level_type(c)) else {
                    return false;
                };
                match leaf {
                    Filter::EqualTo(_, v) => literal_fits(field_type, v),
                    Filter::GreaterThan(_, v)
                    | Filter::GreaterThanOrEqual(_, v)
                    | Filter::LessThan(_, v)
                    | Filter::LessThanOrEqual(_, v) => {
                        *field_type != FieldType::String && literal_fits(field_type, v)
                    }
                    Filter::In(_, values) => {
                        !values.is_empty() && values.iter().all(|v| literal_fits(field_type, v))
                    }
                    Filter::IsNull(_) => *field_type == FieldType::String,
                    Filter::IsNotNull(_) => true,
                    Filter::StringStartsWith(..)
                    | Filter::StringEndsWith(..)
                    | Filter::StringContains(..) => *field_type == FieldType::String,
                    _ => false,
                }
            }
        }
    }

    fn top_level_type(&self, column: &str) -> Option<&FieldType> {
        if column.contains('.') {
            return None;
        }
        self.schema.field(column).map(|f| &f.data_type)
    }

    /// Mango rendering of a pushable predicate
    ///
    /// String columns read back non-string values as text, so value tests on
    /// them also admit documents holding a non-string there; the reader's
    /// re-check removes those that do not match.
    fn push_selector(&self, filter: &Filter) -> JsonValue {
        match filter {
            Filter::And(a, b) => json!({ "$and": [self.push_selector(a), self.push_selector(b)] }),
            Filter::Or(a, b) => json!({ "$or": [self.push_selector(a), self.push_selector(b)] }),
            leaf => {
                let selector = leaf.to_selector();
                let compares_value = !matches!(leaf, Filter::IsNull(_) | Filter::IsNotNull(_));
                match leaf.column() {
                    Some(c)
                        if compares_value
                            && c != ID_FIELD
                            && c != REV_FIELD
                            && self.top_level_type(c) == Some(&FieldType::String) =>
                    {
                        json!({
                            "$or": [
                                selector,
                                { "$and": [{ c: { "$exists": true } }, { "$not": { c: { "$type": "string" } } }] }
                            ]
                        })
                    }
                    _ => selector,
                }
            }
        }
    }

    fn client_side(
        &self,
        mode: AccessMode,
        descriptor: &QueryDescriptor,
        conjuncts: Vec<Filter>,
    ) -> TranslatedQuery {
        TranslatedQuery {
            mode,
            selector: None,
            key_range: KeyRange::full(),
            fields: None,
            columns: descriptor.columns.clone(),
            filters: conjuncts.clone(),
            pushed: Vec::new(),
            residual: conjuncts,
        }
    }

    fn changes(
        &self,
        descriptor: &QueryDescriptor,
        user_selector: Option<JsonValue>,
        conjuncts: Vec<Filter>,
    ) -> TranslatedQuery {
        let (pushed, residual): (Vec<Filter>, Vec<Filter>) =
            conjuncts.iter().cloned().partition(|f| self.is_pushable(f));

        let parts = user_selector
            .into_iter()
            .chain(pushed.iter().map(|f| self.push_selector(f)))
            .collect();

        TranslatedQuery {
            mode: AccessMode::Changes,
            selector: combine(parts),
            key_range: KeyRange::full(),
            fields: None,
            columns: descriptor.columns.clone(),
            filters: conjuncts,
            pushed,
            residual,
        }
    }

    fn all_docs(
        &self,
        descriptor: &QueryDescriptor,
        user_selector: Option<JsonValue>,
        conjuncts: Vec<Filter>,
    ) -> TranslatedQuery {
        let (id_bounds, others): (Vec<Filter>, Vec<Filter>) =
            conjuncts.iter().cloned().partition(|f| id_bound(f).is_some());

        let mango_filters: Vec<&Filter> = others.iter().filter(|f| self.is_pushable(f)).collect();

        if user_selector.is_none() && mango_filters.is_empty() {
            let key_range = id_bounds
                .iter()
                .filter_map(id_bound)
                .fold(KeyRange::full(), |acc, r| acc.intersect(&r));
            let residual = others;
            return TranslatedQuery {
                mode: AccessMode::AllDocs,
                selector: None,
                key_range,
                fields: None,
                columns: descriptor.columns.clone(),
                filters: conjuncts,
                pushed: id_bounds,
                residual,
            };
        }

        let (pushed, residual): (Vec<Filter>, Vec<Filter>) =
            conjuncts.iter().cloned().partition(|f| self.is_pushable(f));

        let parts = user_selector
            .into_iter()
            .chain(pushed.iter().map(|f| self.push_selector(f)))
            .collect();

        let fields = descriptor.columns.as_ref().map(|columns| {
            let mut fields: Vec<String> = columns.clone();
            for filter in &conjuncts {
                fields.extend(filter.columns().into_iter().map(str::to_string));
            }
            fields.push(ID_FIELD.to_string());
            fields.sort();
            fields.dedup();
            fields
        });

        TranslatedQuery {
            mode: AccessMode::Selector,
            selector: combine(parts),
            key_range: KeyRange::full(),
            fields,
            columns: descriptor.columns.clone(),
            filters: conjuncts,
            pushed,
            residual,
        }
    }
}

/// Translate a descriptor against a schema
pub fn translate(descriptor: &QueryDescriptor, schema: &Schema) -> Result<TranslatedQuery> {
    QueryTranslator::new(schema).translate(descriptor)
}

/// Parse and validate a user-supplied Mango selector
pub fn parse_selector(raw: &str) -> Result<JsonValue> {
    let value: JsonValue = serde_json::from_str(raw)
        .map_err(|e| Error::query_translation(format!("invalid selector JSON: {e}")))?;
    if !value.is_object() {
        return Err(Error::query_translation(
            "selector must be a JSON object",
        ));
    }
    Ok(value)
}

/// Split `_design/d/_view/v?reduce=true` into path and decoded parameters
pub fn split_path(raw: &str) -> Result<(String, Vec<(String, String)>)> {
    let (path, query) = match raw.split_once('?') {
        Some((path, query)) => (path, query),
        None => (raw, ""),
    };
    let path = path.trim().trim_matches('/');
    if path.is_empty() {
        return Err(Error::query_translation(format!("empty index path in '{raw}'")));
    }
    let params = url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    Ok((path.to_string(), params))
}

fn split_conjunction(filter: &Filter) -> Vec<Filter> {
    match filter {
        Filter::And(a, b) => {
            let mut out = split_conjunction(a);
            out.extend(split_conjunction(b));
            out
        }
        other => vec![other.clone()],
    }
}

/// Key range implied by a predicate on `_id`, in raw key order
fn id_bound(filter: &Filter) -> Option<KeyRange> {
    let key = |v: &JsonValue| v.as_str().map(str::to_string);
    match filter {
        Filter::EqualTo(c, v) if c == ID_FIELD => {
            let k = key(v)?;
            Some(KeyRange {
                start: Some(k.clone()),
                end: Some(k),
                inclusive_end: true,
            })
        }
        Filter::GreaterThan(c, v) | Filter::GreaterThanOrEqual(c, v) if c == ID_FIELD => {
            Some(KeyRange {
                start: Some(key(v)?),
                end: None,
                inclusive_end: false,
            })
        }
        Filter::LessThan(c, v) if c == ID_FIELD => Some(KeyRange::half_open(None, Some(key(v)?))),
        Filter::LessThanOrEqual(c, v) if c == ID_FIELD => Some(KeyRange {
            start: None,
            end: Some(key(v)?),
            inclusive_end: true,
        }),
        _ => None,
    }
}

fn literal_fits(field_type: &FieldType, literal: &JsonValue) -> bool {
    matches!(
        (field_type, literal),
        (FieldType::Boolean, JsonValue::Bool(_))
            | (FieldType::Integer | FieldType::Number, JsonValue::Number(_))
            | (FieldType::String, JsonValue::String(_))
    )
}

fn combine(mut parts: Vec<JsonValue>) -> Option<JsonValue> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(json!({ "$and": parts })),
    }
}
