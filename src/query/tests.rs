//! Query translation tests

use super::*;
use crate::config::{Endpoint, ReadOptions};
use crate::error::Error;
use crate::schema::infer_schema;
use crate::schema::Schema;
use crate::store::KeyRange;
use crate::types::JsonObject;
use serde_json::{json, Value};
use test_case::test_case;

fn animals_schema() -> Schema {
    infer_schema(&[
        json!({
            "_id": "aardvark", "_rev": "1-a", "class": "mammal", "legs": 4,
            "weight": 40.5, "wiki": true, "address": {"city": "x"}, "tags": ["a"], "note": null
        }),
        json!({"_id": "owl", "_rev": "1-b", "class": "bird", "legs": 2, "weight": 1}),
    ])
    .unwrap()
}

fn row(value: Value) -> JsonObject {
    value.as_object().cloned().unwrap()
}

// ============================================================================
// Filter evaluation
// ============================================================================

#[test_case(Filter::eq("legs", 4) => Some(true); "equal")]
#[test_case(Filter::eq("legs", 4.0) => Some(true); "integer equals float")]
#[test_case(Filter::eq("legs", 2) => Some(false); "not equal")]
#[test_case(Filter::eq("legs", Value::Null) => None; "equal null literal")]
#[test_case(Filter::eq("missing", 1) => None; "equal missing column")]
#[test_case(Filter::gt("weight", 40) => Some(true); "greater than")]
#[test_case(Filter::le("class", "bird") => Some(false); "string order")]
#[test_case(Filter::gt("class", 1) => None; "mixed kinds are unknown")]
#[test_case(Filter::EqualNullSafe("note".into(), Value::Null) => Some(true); "null safe null")]
#[test_case(Filter::EqualNullSafe("legs".into(), Value::Null) => Some(false); "null safe value")]
#[test_case(Filter::In("class".into(), vec![json!("bird"), json!("mammal")]) => Some(true); "in list")]
#[test_case(Filter::In("class".into(), vec![json!("bird"), Value::Null]) => None; "in list with null")]
#[test_case(Filter::IsNull("note".into()) => Some(true); "is null")]
#[test_case(Filter::IsNull("absent".into()) => Some(true); "missing is null")]
#[test_case(Filter::IsNotNull("legs".into()) => Some(true); "is not null")]
#[test_case(Filter::StringStartsWith("class".into(), "mam".into()) => Some(true); "starts with")]
#[test_case(Filter::StringEndsWith("class".into(), "mal".into()) => Some(true); "ends with")]
#[test_case(Filter::StringContains("legs".into(), "4".into()) => Some(false); "contains on number")]
#[test_case(Filter::eq("address.city", "Paris") => Some(true); "nested path")]
fn test_filter_evaluate(filter: Filter) -> Option<bool> {
    let r = row(json!({
        "_id": "aardvark", "class": "mammal", "legs": 4, "weight": 40.5,
        "note": null, "address": {"city": "Paris"}
    }));
    filter.evaluate(&r)
}

#[test]
fn test_three_valued_logic() {
    let r = row(json!({"a": 1, "b": null}));
    let t = Filter::eq("a", 1);
    let f = Filter::eq("a", 2);
    let u = Filter::eq("b", 1);

    assert_eq!(t.clone().and(u.clone()).evaluate(&r), None);
    assert_eq!(f.clone().and(u.clone()).evaluate(&r), Some(false));
    assert_eq!(t.clone().or(u.clone()).evaluate(&r), Some(true));
    assert_eq!(f.clone().or(u.clone()).evaluate(&r), None);
    assert_eq!(u.clone().negate().evaluate(&r), None);
    assert!(!u.negate().matches(&r));
    assert!(f.negate().matches(&r));
}

#[test]
fn test_filter_columns_and_display() {
    let filter = Filter::eq("b", 1).and(Filter::gt("a", 2).or(Filter::IsNull("b".into())));
    assert_eq!(filter.columns(), vec!["a", "b"]);
    assert_eq!(filter.to_string(), "(b = 1 AND (a > 2 OR b IS NULL))");
}

#[test]
fn test_filter_selectors() {
    assert_eq!(Filter::eq("legs", 4).to_selector(), json!({"legs": {"$eq": 4}}));
    assert_eq!(
        Filter::In("class".into(), vec![json!("bird")]).to_selector(),
        json!({"class": {"$in": ["bird"]}})
    );
    assert_eq!(
        Filter::StringStartsWith("name".into(), "a.b".into()).to_selector(),
        json!({"name": {"$regex": "^a\\.b"}})
    );
    assert_eq!(
        Filter::IsNull("note".into()).to_selector(),
        json!({"$or": [{"note": {"$exists": false}}, {"note": {"$type": "null"}}]})
    );
}

// ============================================================================
// Mode selection
// ============================================================================

#[test]
fn test_unfiltered_scan_uses_endpoint() {
    let schema = animals_schema();

    let all = translate(&QueryDescriptor::new(Endpoint::AllDocs), &schema).unwrap();
    assert_eq!(all.mode, AccessMode::AllDocs);
    assert!(all.selector.is_none());
    assert!(all.key_range.is_full());

    let changes = translate(&QueryDescriptor::new(Endpoint::Changes), &schema).unwrap();
    assert_eq!(changes.mode, AccessMode::Changes);
    assert!(changes.selector.is_none());
}

#[test]
fn test_view_takes_precedence() {
    let schema = animals_schema();
    let options = ReadOptions::new()
        .with_view("_design/views101/_view/latin_name?reduce=false")
        .with_index("_design/views101/_search/animals")
        .with_selector(r#"{"class": "bird"}"#);

    let descriptor = QueryDescriptor::from_options(&options, Endpoint::AllDocs)
        .with_filters(vec![Filter::eq("class", "bird")]);
    let query = translate(&descriptor, &schema).unwrap();

    assert_eq!(
        query.mode,
        AccessMode::View {
            path: "_design/views101/_view/latin_name".to_string(),
            params: vec![("reduce".to_string(), "false".to_string())],
        }
    );
    assert!(query.selector.is_none());
    assert!(query.pushed.is_empty());
    assert_eq!(query.residual, vec![Filter::eq("class", "bird")]);
}

#[test]
fn test_index_beats_selector_and_defaults_query() {
    let schema = animals_schema();
    let options = ReadOptions::new()
        .with_index("_design/views101/_search/animals")
        .with_selector(r#"{"class": "bird"}"#);

    let query = translate(&QueryDescriptor::from_options(&options, Endpoint::AllDocs), &schema).unwrap();
    assert_eq!(
        query.mode,
        AccessMode::Search {
            path: "_design/views101/_search/animals".to_string(),
            params: vec![("q".to_string(), MATCH_ALL_QUERY.to_string())],
        }
    );

    let options = ReadOptions::new().with_index("_design/d/_search/s?q=class:bird");
    let query = translate(&QueryDescriptor::from_options(&options, Endpoint::AllDocs), &schema).unwrap();
    assert_eq!(
        query.mode,
        AccessMode::Search {
            path: "_design/d/_search/s".to_string(),
            params: vec![("q".to_string(), "class:bird".to_string())],
        }
    );
}

#[test]
fn test_user_selector_selects_find() {
    let schema = animals_schema();
    let options = ReadOptions::new().with_selector(r#"{"class": "bird"}"#);

    let query = translate(&QueryDescriptor::from_options(&options, Endpoint::AllDocs), &schema).unwrap();
    assert_eq!(query.mode, AccessMode::Selector);
    assert_eq!(query.selector, Some(json!({"class": "bird"})));
}

#[test_case("{not json"; "malformed")]
#[test_case("[1, 2]"; "array")]
#[test_case("\"class\""; "string")]
fn test_invalid_selector_is_translation_error(raw: &str) {
    let schema = animals_schema();
    let options = ReadOptions::new().with_selector(raw);

    let err = translate(&QueryDescriptor::from_options(&options, Endpoint::AllDocs), &schema).unwrap_err();
    assert!(matches!(err, Error::QueryTranslation { .. }));
}

#[test]
fn test_unknown_column_is_translation_error() {
    let schema = animals_schema();
    let descriptor = QueryDescriptor::new(Endpoint::AllDocs).with_columns(["class", "colour"]);

    let err = translate(&descriptor, &schema).unwrap_err();
    assert!(matches!(err, Error::QueryTranslation { ref message } if message.contains("colour")));
}

// ============================================================================
// Pushdown
// ============================================================================

#[test]
fn test_id_range_becomes_key_range() {
    let schema = animals_schema();
    let descriptor = QueryDescriptor::new(Endpoint::AllDocs).with_filters(vec![
        Filter::ge("_id", "b").and(Filter::lt("_id", "m")),
        Filter::gt("_id", "c"),
    ]);

    let query = translate(&descriptor, &schema).unwrap();

    assert_eq!(query.mode, AccessMode::AllDocs);
    assert_eq!(
        query.key_range,
        KeyRange::half_open(Some("c".to_string()), Some("m".to_string()))
    );
    assert_eq!(query.pushed.len(), 3);
    assert!(query.residual.is_empty());
    assert_eq!(query.filters.len(), 3);
}

#[test]
fn test_contradictory_id_range_is_empty() {
    let schema = animals_schema();
    let descriptor = QueryDescriptor::new(Endpoint::AllDocs)
        .with_filters(vec![Filter::gt("_id", "z"), Filter::lt("_id", "a")]);

    assert!(translate(&descriptor, &schema).unwrap().is_empty());
}

#[test]
fn test_pushable_filters_build_selector() {
    let schema = animals_schema();
    let descriptor = QueryDescriptor::new(Endpoint::AllDocs).with_filters(vec![
        Filter::gt("legs", 2),
        Filter::eq("wiki", true),
        Filter::eq("_id", "aardvark"),
    ]);

    let query = translate(&descriptor, &schema).unwrap();

    assert_eq!(query.mode, AccessMode::Selector);
    assert_eq!(
        query.selector,
        Some(json!({"$and": [
            {"legs": {"$gt": 2}},
            {"wiki": {"$eq": true}},
            {"_id": {"$eq": "aardvark"}}
        ]}))
    );
    assert!(query.residual.is_empty());
}

#[test]
fn test_string_predicates_carry_guard() {
    let schema = animals_schema();
    let descriptor =
        QueryDescriptor::new(Endpoint::AllDocs).with_filters(vec![Filter::eq("class", "bird")]);

    let query = translate(&descriptor, &schema).unwrap();

    assert_eq!(
        query.selector,
        Some(json!({"$or": [
            {"class": {"$eq": "bird"}},
            {"$and": [{"class": {"$exists": true}}, {"$not": {"class": {"$type": "string"}}}]}
        ]}))
    );
}

#[test_case(Filter::eq("legs", "4"); "literal kind mismatch")]
#[test_case(Filter::eq("legs", Value::Null); "null literal")]
#[test_case(Filter::EqualNullSafe("legs".into(), json!(4)); "null safe equality")]
#[test_case(Filter::gt("class", "m"); "string range")]
#[test_case(Filter::IsNull("legs".into()); "is null on number column")]
#[test_case(Filter::eq("legs", 4).negate(); "negation")]
#[test_case(Filter::eq("address.city", "x"); "nested column")]
#[test_case(Filter::eq("colour", "red"); "unknown column")]
#[test_case(Filter::eq("tags", "a"); "array column")]
#[test_case(Filter::eq("legs", 4).or(Filter::gt("class", "m")); "or with residual child")]
#[test_case(Filter::StringContains("legs".into(), "4".into()); "string test on number")]
fn test_non_pushable_filters(filter: Filter) {
    let schema = animals_schema();
    assert!(!QueryTranslator::new(&schema).is_pushable(&filter));
}

#[test_case(Filter::eq("legs", 4); "integer equality")]
#[test_case(Filter::le("weight", 10.5); "number range")]
#[test_case(Filter::In("legs".into(), vec![json!(2), json!(4)]); "in list")]
#[test_case(Filter::IsNull("class".into()); "is null on string column")]
#[test_case(Filter::IsNotNull("legs".into()); "is not null")]
#[test_case(Filter::StringEndsWith("class".into(), "al".into()); "ends with")]
#[test_case(Filter::eq("legs", 4).or(Filter::eq("class", "bird")); "or of pushable")]
fn test_pushable_filters(filter: Filter) {
    let schema = animals_schema();
    assert!(QueryTranslator::new(&schema).is_pushable(&filter));
}

#[test]
fn test_residual_only_filters_keep_all_docs_mode() {
    let schema = animals_schema();
    let descriptor = QueryDescriptor::new(Endpoint::AllDocs)
        .with_filters(vec![Filter::gt("class", "m"), Filter::lt("_id", "p")]);

    let query = translate(&descriptor, &schema).unwrap();

    assert_eq!(query.mode, AccessMode::AllDocs);
    assert_eq!(query.key_range, KeyRange::half_open(None, Some("p".to_string())));
    assert_eq!(query.residual, vec![Filter::gt("class", "m")]);
}

#[test]
fn test_user_selector_combined_with_filters() {
    let schema = animals_schema();
    let options = ReadOptions::new().with_selector(r#"{"wiki": true}"#);
    let descriptor = QueryDescriptor::from_options(&options, Endpoint::AllDocs)
        .with_filters(vec![Filter::lt("legs", 3), Filter::gt("class", "a")]);

    let query = translate(&descriptor, &schema).unwrap();

    assert_eq!(
        query.selector,
        Some(json!({"$and": [{"wiki": true}, {"legs": {"$lt": 3}}]}))
    );
    assert_eq!(query.pushed, vec![Filter::lt("legs", 3)]);
    assert_eq!(query.residual, vec![Filter::gt("class", "a")]);
}

#[test]
fn test_changes_mode_with_selector() {
    let schema = animals_schema();
    let descriptor = QueryDescriptor::new(Endpoint::Changes)
        .with_filters(vec![Filter::eq("wiki", true), Filter::lt("_id", "m")]);

    let query = translate(&descriptor, &schema).unwrap();

    assert_eq!(query.mode, AccessMode::Changes);
    assert_eq!(query.selector, Some(json!({"wiki": {"$eq": true}})));
    assert!(query.key_range.is_full());
    assert_eq!(query.residual, vec![Filter::lt("_id", "m")]);
}

#[test]
fn test_find_fields_include_filter_columns() {
    let schema = animals_schema();
    let descriptor = QueryDescriptor::new(Endpoint::AllDocs)
        .with_columns(["class"])
        .with_filters(vec![Filter::gt("legs", 2)]);

    let query = translate(&descriptor, &schema).unwrap();

    assert_eq!(
        query.fields,
        Some(vec!["_id".to_string(), "class".to_string(), "legs".to_string()])
    );
    assert_eq!(query.output_schema(&schema).field_names(), vec!["class"]);
}

#[test]
fn test_split_path() {
    let (path, params) = split_path("/_design/d/_view/v?reduce=true&group_level=2").unwrap();
    assert_eq!(path, "_design/d/_view/v");
    assert_eq!(
        params,
        vec![
            ("reduce".to_string(), "true".to_string()),
            ("group_level".to_string(), "2".to_string()),
        ]
    );

    assert!(split_path("?reduce=true").is_err());
}

#[test]
fn test_accepts_applies_every_filter() {
    let schema = animals_schema();
    let descriptor = QueryDescriptor::new(Endpoint::AllDocs)
        .with_filters(vec![Filter::ge("_id", "b"), Filter::gt("class", "c")]);
    let query = translate(&descriptor, &schema).unwrap();

    assert!(query.accepts(&row(json!({"_id": "owl", "class": "mammal"}))));
    assert!(!query.accepts(&row(json!({"_id": "owl", "class": "bird"}))));
    assert!(!query.accepts(&row(json!({"_id": "a", "class": "mammal"}))));
}
