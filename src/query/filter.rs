//! Predicate expression tree
//!
//! Filters arrive from the host engine as an abstract tree. Each one can be
//! evaluated against a decoded row with SQL three-valued logic, and the
//! subset the store understands can be rendered as a Mango selector.

use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cmp::Ordering;

/// A tabular predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    EqualTo(String, JsonValue),
    /// `<=>`: like `EqualTo` but `null <=> null` is true
    EqualNullSafe(String, JsonValue),
    GreaterThan(String, JsonValue),
    GreaterThanOrEqual(String, JsonValue),
    LessThan(String, JsonValue),
    LessThanOrEqual(String, JsonValue),
    In(String, Vec<JsonValue>),
    IsNull(String),
    IsNotNull(String),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
    StringStartsWith(String, String),
    StringEndsWith(String, String),
    StringContains(String, String),
}

impl Filter {
    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Filter::EqualTo(column.into(), value.into())
    }

    /// `column > value`
    pub fn gt(column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Filter::GreaterThan(column.into(), value.into())
    }

    /// `column >= value`
    pub fn ge(column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Filter::GreaterThanOrEqual(column.into(), value.into())
    }

    /// `column < value`
    pub fn lt(column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Filter::LessThan(column.into(), value.into())
    }

    /// `column <= value`
    pub fn le(column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Filter::LessThanOrEqual(column.into(), value.into())
    }

    /// `a AND b`
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        Filter::And(Box::new(self), Box::new(other))
    }

    /// `a OR b`
    #[must_use]
    pub fn or(self, other: Filter) -> Self {
        Filter::Or(Box::new(self), Box::new(other))
    }

    /// `NOT a`
    #[must_use]
    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Columns referenced anywhere in the tree
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::And(a, b) | Filter::Or(a, b) => {
                a.collect_columns(out);
                b.collect_columns(out);
            }
            Filter::Not(inner) => inner.collect_columns(out),
            leaf => {
                if let Some(column) = leaf.column() {
                    out.push(column);
                }
            }
        }
    }

    /// Column of a leaf predicate
    pub fn column(&self) -> Option<&str> {
        match self {
            Filter::EqualTo(c, _)
            | Filter::EqualNullSafe(c, _)
            | Filter::GreaterThan(c, _)
            | Filter::GreaterThanOrEqual(c, _)
            | Filter::LessThan(c, _)
            | Filter::LessThanOrEqual(c, _)
            | Filter::In(c, _)
            | Filter::IsNull(c)
            | Filter::IsNotNull(c)
            | Filter::StringStartsWith(c, _)
            | Filter::StringEndsWith(c, _)
            | Filter::StringContains(c, _) => Some(c),
            Filter::And(..) | Filter::Or(..) | Filter::Not(_) => None,
        }
    }

    /// Evaluate against a row: `Some(true)`, `Some(false)` or unknown (`None`)
    pub fn evaluate(&self, row: &JsonObject) -> Option<bool> {
        match self {
            Filter::EqualTo(c, v) => {
                let actual = non_null(lookup(row, c))?;
                if v.is_null() {
                    return None;
                }
                Some(json_eq(actual, v))
            }
            Filter::EqualNullSafe(c, v) => Some(match non_null(lookup(row, c)) {
                None => v.is_null(),
                Some(actual) => !v.is_null() && json_eq(actual, v),
            }),
            Filter::GreaterThan(c, v) => compare(row, c, v).map(Ordering::is_gt),
            Filter::GreaterThanOrEqual(c, v) => compare(row, c, v).map(Ordering::is_ge),
            Filter::LessThan(c, v) => compare(row, c, v).map(Ordering::is_lt),
            Filter::LessThanOrEqual(c, v) => compare(row, c, v).map(Ordering::is_le),
            Filter::In(c, values) => {
                let actual = non_null(lookup(row, c))?;
                if values.iter().any(|v| !v.is_null() && json_eq(actual, v)) {
                    Some(true)
                } else if values.iter().any(JsonValue::is_null) {
                    None
                } else {
                    Some(false)
                }
            }
            Filter::IsNull(c) => Some(non_null(lookup(row, c)).is_none()),
            Filter::IsNotNull(c) => Some(non_null(lookup(row, c)).is_some()),
            Filter::And(a, b) => match (a.evaluate(row), b.evaluate(row)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Filter::Or(a, b) => match (a.evaluate(row), b.evaluate(row)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Filter::Not(inner) => inner.evaluate(row).map(|r| !r),
            Filter::StringStartsWith(c, s) => string_test(row, c, |v| v.starts_with(s.as_str())),
            Filter::StringEndsWith(c, s) => string_test(row, c, |v| v.ends_with(s.as_str())),
            Filter::StringContains(c, s) => string_test(row, c, |v| v.contains(s.as_str())),
        }
    }

    /// Check whether a row passes (unknown counts as rejected)
    pub fn matches(&self, row: &JsonObject) -> bool {
        self.evaluate(row) == Some(true)
    }

    /// Render as a Mango selector
    ///
    /// Only meaningful for filters the translator decided to push; the
    /// rendering does not check pushability itself.
    pub fn to_selector(&self) -> JsonValue {
        match self {
            Filter::EqualTo(c, v) | Filter::EqualNullSafe(c, v) => json!({ c: { "$eq": v } }),
            Filter::GreaterThan(c, v) => json!({ c: { "$gt": v } }),
            Filter::GreaterThanOrEqual(c, v) => json!({ c: { "$gte": v } }),
            Filter::LessThan(c, v) => json!({ c: { "$lt": v } }),
            Filter::LessThanOrEqual(c, v) => json!({ c: { "$lte": v } }),
            Filter::In(c, values) => json!({ c: { "$in": values } }),
            Filter::IsNull(c) => json!({
                "$or": [{ c: { "$exists": false } }, { c: { "$type": "null" } }]
            }),
            Filter::IsNotNull(c) => json!({
                "$and": [{ c: { "$exists": true } }, { "$not": { c: { "$type": "null" } } }]
            }),
            Filter::And(a, b) => json!({ "$and": [a.to_selector(), b.to_selector()] }),
            Filter::Or(a, b) => json!({ "$or": [a.to_selector(), b.to_selector()] }),
            Filter::Not(inner) => json!({ "$not": inner.to_selector() }),
            Filter::StringStartsWith(c, s) => {
                json!({ c: { "$regex": format!("^{}", regex::escape(s)) } })
            }
            Filter::StringEndsWith(c, s) => {
                json!({ c: { "$regex": format!("{}$", regex::escape(s)) } })
            }
            Filter::StringContains(c, s) => json!({ c: { "$regex": regex::escape(s) } }),
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::EqualTo(c, v) => write!(f, "{c} = {v}"),
            Filter::EqualNullSafe(c, v) => write!(f, "{c} <=> {v}"),
            Filter::GreaterThan(c, v) => write!(f, "{c} > {v}"),
            Filter::GreaterThanOrEqual(c, v) => write!(f, "{c} >= {v}"),
            Filter::LessThan(c, v) => write!(f, "{c} < {v}"),
            Filter::LessThanOrEqual(c, v) => write!(f, "{c} <= {v}"),
            Filter::In(c, values) => write!(f, "{c} IN {}", JsonValue::Array(values.clone())),
            Filter::IsNull(c) => write!(f, "{c} IS NULL"),
            Filter::IsNotNull(c) => write!(f, "{c} IS NOT NULL"),
            Filter::And(a, b) => write!(f, "({a} AND {b})"),
            Filter::Or(a, b) => write!(f, "({a} OR {b})"),
            Filter::Not(inner) => write!(f, "NOT ({inner})"),
            Filter::StringStartsWith(c, s) => write!(f, "{c} LIKE '{s}%'"),
            Filter::StringEndsWith(c, s) => write!(f, "{c} LIKE '%{s}'"),
            Filter::StringContains(c, s) => write!(f, "{c} LIKE '%{s}%'"),
        }
    }
}

/// Resolve a column: exact key first, then a dotted path into nested objects
pub fn lookup<'a>(row: &'a JsonObject, column: &str) -> Option<&'a JsonValue> {
    if let Some(value) = row.get(column) {
        return Some(value);
    }
    let mut parts = column.split('.');
    let mut current = row.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn non_null(value: Option<&JsonValue>) -> Option<&JsonValue> {
    value.filter(|v| !v.is_null())
}

fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

/// Order two values of the same kind; mixed kinds are incomparable
fn json_cmp(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare(row: &JsonObject, column: &str, literal: &JsonValue) -> Option<Ordering> {
    json_cmp(non_null(lookup(row, column))?, literal)
}

fn string_test(row: &JsonObject, column: &str, test: impl Fn(&str) -> bool) -> Option<bool> {
    let actual = non_null(lookup(row, column))?;
    Some(actual.as_str().is_some_and(test))
}
