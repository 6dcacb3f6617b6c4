//! In-memory document store served through a mock HTTP server
//!
//! Implements the subset of the CouchDB API the connector uses: database
//! management, `_all_docs` (ranges, skip/limit, key lookups), `_find` with a
//! Mango matcher and bookmarks, `_changes` with `filter=_selector`,
//! `_bulk_docs` with revision checks and `by_<field>` views.

#![allow(dead_code)]

use cloudant_connector::config::ConnectionConfig;
use cloudant_connector::CloudantConnector;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone)]
struct StoredDoc {
    generation: u64,
    seq: u64,
    deleted: bool,
    body: Map<String, Value>,
}

impl StoredDoc {
    fn rev(&self) -> String {
        format!("{}-{:08x}", self.generation, self.seq)
    }

    fn to_json(&self, id: &str) -> Value {
        let mut doc = Map::new();
        doc.insert("_id".to_string(), json!(id));
        doc.insert("_rev".to_string(), json!(self.rev()));
        if self.deleted {
            doc.insert("_deleted".to_string(), json!(true));
        }
        doc.extend(self.body.clone());
        Value::Object(doc)
    }
}

#[derive(Debug, Default)]
struct Database {
    docs: BTreeMap<String, StoredDoc>,
    seq: u64,
    generated: u64,
}

impl Database {
    fn live(&self) -> impl Iterator<Item = (&String, &StoredDoc)> {
        self.docs.iter().filter(|(_, d)| !d.deleted)
    }

    /// Store one document, enforcing revisions; returns the bulk result
    fn put(&mut self, doc: &Value) -> Value {
        let Some(mut body) = doc.as_object().cloned() else {
            return json!({"error": "bad_request", "reason": "Document must be a JSON object"});
        };
        let id = match body.remove("_id").and_then(|v| v.as_str().map(str::to_string)) {
            Some(id) => id,
            None => {
                self.generated += 1;
                format!("{:016x}", self.generated)
            }
        };
        let rev = body.remove("_rev").and_then(|v| v.as_str().map(str::to_string));
        let deleted = body.remove("_deleted") == Some(json!(true));

        let generation = match self.docs.get(&id) {
            Some(existing) if !existing.deleted && rev.as_deref() != Some(existing.rev().as_str()) => {
                return json!({"id": id, "error": "conflict", "reason": "Document update conflict."});
            }
            Some(existing) if existing.deleted && rev.is_some() && rev != Some(existing.rev()) => {
                return json!({"id": id, "error": "conflict", "reason": "Document update conflict."});
            }
            Some(existing) => existing.generation + 1,
            None => 1,
        };

        self.seq += 1;
        let stored = StoredDoc {
            generation,
            seq: self.seq,
            deleted,
            body,
        };
        let rev = stored.rev();
        self.docs.insert(id.clone(), stored);
        json!({"ok": true, "id": id, "rev": rev})
    }
}

#[derive(Debug, Default)]
struct State {
    databases: BTreeMap<String, Database>,
}

/// Shared handle to the fake store
#[derive(Debug, Clone, Default)]
pub struct FakeCouch {
    state: Arc<Mutex<State>>,
}

impl FakeCouch {
    /// Start a mock server backed by a fresh store
    pub async fn start() -> (MockServer, FakeCouch) {
        let server = MockServer::start().await;
        let fake = FakeCouch::default();
        Mock::given(any())
            .respond_with(fake.clone())
            .mount(&server)
            .await;
        (server, fake)
    }

    pub fn create_db(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .databases
            .entry(name.to_string())
            .or_default();
    }

    pub fn has_db(&self, name: &str) -> bool {
        self.state.lock().unwrap().databases.contains_key(name)
    }

    /// Insert documents, creating the database if needed
    pub fn insert(&self, db: &str, docs: &[Value]) {
        let mut state = self.state.lock().unwrap();
        let database = state.databases.entry(db.to_string()).or_default();
        for doc in docs {
            let result = database.put(doc);
            assert_eq!(result["ok"], json!(true), "insert failed: {result}");
        }
    }

    /// Delete a document at its current revision
    pub fn delete(&self, db: &str, id: &str) {
        let mut state = self.state.lock().unwrap();
        let database = state.databases.get_mut(db).unwrap();
        let rev = database.docs[id].rev();
        let result = database.put(&json!({"_id": id, "_rev": rev, "_deleted": true}));
        assert_eq!(result["ok"], json!(true));
    }

    /// Live document body by id
    pub fn get(&self, db: &str, id: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        let doc = state.databases.get(db)?.docs.get(id)?;
        (!doc.deleted).then(|| doc.to_json(id))
    }

    /// Live documents, design documents included
    pub fn live_count(&self, db: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .databases
            .get(db)
            .map_or(0, |d| d.live().count())
    }
}

/// Connector pointed at the mock server
pub fn connector(server: &MockServer, database: Option<&str>) -> CloudantConnector {
    let mut config = ConnectionConfig::from_url(&server.uri()).unwrap();
    config.http.max_retries = 0;
    config.database = database.map(str::to_string);
    CloudantConnector::new(config).unwrap()
}

// ============================================================================
// HTTP routing
// ============================================================================

fn reply(status: u16, body: Value) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(body)
}

fn not_found(reason: &str) -> ResponseTemplate {
    reply(404, json!({"error": "not_found", "reason": reason}))
}

impl Respond for FakeCouch {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let segments: Vec<String> = request
            .url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        let params: HashMap<String, String> = request.url.query_pairs().into_owned().collect();
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let method = request.method.as_str().to_string();

        let mut state = self.state.lock().unwrap();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        match (method.as_str(), segments.as_slice()) {
            ("GET", []) => reply(200, json!({"couchdb": "Welcome", "version": "3.3.3"})),
            ("PUT", [db]) => {
                if state.databases.contains_key(*db) {
                    reply(412, json!({"error": "file_exists", "reason": "The database could not be created, the file already exists."}))
                } else {
                    state.databases.insert((*db).to_string(), Database::default());
                    reply(201, json!({"ok": true}))
                }
            }
            ("DELETE", [db]) => match state.databases.remove(*db) {
                Some(_) => reply(200, json!({"ok": true})),
                None => not_found("Database does not exist."),
            },
            (_, [db, rest @ ..]) => {
                let Some(database) = state.databases.get_mut(*db) else {
                    return not_found("Database does not exist.");
                };
                route_database(database, db, &method, rest, &params, &body)
            }
            _ => not_found("missing"),
        }
    }
}

fn route_database(
    database: &mut Database,
    name: &str,
    method: &str,
    rest: &[&str],
    params: &HashMap<String, String>,
    body: &Value,
) -> ResponseTemplate {
    match (method, rest) {
        ("HEAD", []) => ResponseTemplate::new(200),
        ("GET", []) => reply(
            200,
            json!({
                "db_name": name,
                "doc_count": database.live().count(),
                "doc_del_count": database.docs.len() - database.live().count(),
                "update_seq": format!("{}-fake", database.seq)
            }),
        ),
        ("GET", ["_all_docs"]) => all_docs(database, params),
        ("POST", ["_all_docs"]) => all_docs_keys(database, body),
        ("POST", ["_find"]) => find(database, body),
        ("GET" | "POST", ["_changes"]) => changes(database, params, body),
        ("POST", ["_bulk_docs"]) => {
            let docs = body["docs"].as_array().cloned().unwrap_or_default();
            let results: Vec<Value> = docs.iter().map(|doc| database.put(doc)).collect();
            reply(201, Value::Array(results))
        }
        ("GET", ["_design", _, "_view", view]) => run_view(database, view, params),
        ("GET", [id]) => match database.docs.get(*id) {
            Some(doc) if !doc.deleted => reply(200, doc.to_json(id)),
            _ => not_found("missing"),
        },
        _ => not_found("missing"),
    }
}

fn json_param(params: &HashMap<String, String>, key: &str) -> Option<Value> {
    params.get(key).and_then(|v| serde_json::from_str(v).ok())
}

fn usize_param(params: &HashMap<String, String>, key: &str) -> Option<usize> {
    params.get(key).and_then(|v| v.parse().ok())
}

fn all_docs(database: &Database, params: &HashMap<String, String>) -> ResponseTemplate {
    let start = json_param(params, "startkey").and_then(|v| v.as_str().map(str::to_string));
    let end = json_param(params, "endkey").and_then(|v| v.as_str().map(str::to_string));
    let inclusive_end = params.get("inclusive_end").map_or(true, |v| v == "true");
    let include_docs = params.get("include_docs").is_some_and(|v| v == "true");
    let skip = usize_param(params, "skip").unwrap_or(0);
    let limit = usize_param(params, "limit").unwrap_or(usize::MAX);

    let rows: Vec<Value> = database
        .live()
        .filter(|(id, _)| start.as_ref().map_or(true, |s| id.as_str() >= s.as_str()))
        .filter(|(id, _)| match &end {
            Some(e) if inclusive_end => id.as_str() <= e.as_str(),
            Some(e) => id.as_str() < e.as_str(),
            None => true,
        })
        .skip(skip)
        .take(limit)
        .map(|(id, doc)| {
            let mut row = json!({"id": id, "key": id, "value": {"rev": doc.rev()}});
            if include_docs {
                row["doc"] = doc.to_json(id);
            }
            row
        })
        .collect();

    reply(
        200,
        json!({"total_rows": database.live().count(), "offset": skip, "rows": rows}),
    )
}

fn all_docs_keys(database: &Database, body: &Value) -> ResponseTemplate {
    let keys = body["keys"].as_array().cloned().unwrap_or_default();
    let rows: Vec<Value> = keys
        .iter()
        .filter_map(Value::as_str)
        .map(|key| match database.docs.get(key) {
            Some(doc) if doc.deleted => {
                json!({"id": key, "key": key, "value": {"rev": doc.rev(), "deleted": true}})
            }
            Some(doc) => json!({"id": key, "key": key, "value": {"rev": doc.rev()}}),
            None => json!({"key": key, "error": "not_found"}),
        })
        .collect();
    reply(200, json!({"rows": rows}))
}

fn find(database: &Database, body: &Value) -> ResponseTemplate {
    let selector = &body["selector"];
    if !selector.is_object() {
        return reply(400, json!({"error": "bad_request", "reason": "selector must be an object"}));
    }
    let limit = body["limit"].as_u64().map_or(25, |l| l as usize);
    let after = body["bookmark"].as_str().map(str::to_string);
    let fields: Option<Vec<String>> = body["fields"]
        .as_array()
        .map(|f| f.iter().filter_map(|v| v.as_str().map(str::to_string)).collect());

    let page: Vec<(String, Value)> = database
        .live()
        .filter(|(id, _)| !id.starts_with("_design/"))
        .filter(|(id, _)| after.as_ref().map_or(true, |a| id.as_str() > a.as_str()))
        .map(|(id, doc)| (id.clone(), doc.to_json(id)))
        .filter(|(_, doc)| doc.as_object().is_some_and(|d| matches(selector, d)))
        .take(limit)
        .collect();

    let bookmark = page
        .last()
        .map(|(id, _)| id.clone())
        .or(after)
        .unwrap_or_else(|| "nil".to_string());
    let docs: Vec<Value> = page
        .into_iter()
        .map(|(_, doc)| match &fields {
            Some(fields) => {
                let obj = doc.as_object().cloned().unwrap_or_default();
                Value::Object(
                    obj.into_iter()
                        .filter(|(k, _)| fields.contains(k))
                        .collect(),
                )
            }
            None => doc,
        })
        .collect();

    reply(200, json!({"docs": docs, "bookmark": bookmark}))
}

fn parse_seq(raw: &str) -> u64 {
    raw.split('-').next().and_then(|n| n.parse().ok()).unwrap_or(0)
}

fn changes(database: &Database, params: &HashMap<String, String>, body: &Value) -> ResponseTemplate {
    let since = params.get("since").map_or(0, |s| parse_seq(s));
    let limit = usize_param(params, "limit").unwrap_or(usize::MAX);
    let include_docs = params.get("include_docs").is_some_and(|v| v == "true");
    let selector = (params.get("filter").map(String::as_str) == Some("_selector"))
        .then(|| body["selector"].clone());

    let mut entries: Vec<(&String, &StoredDoc)> = database
        .docs
        .iter()
        .filter(|(_, doc)| doc.seq > since)
        .filter(|(id, doc)| match &selector {
            Some(selector) => doc
                .to_json(id)
                .as_object()
                .is_some_and(|d| !doc.deleted && matches(selector, d)),
            None => true,
        })
        .collect();
    entries.sort_by_key(|(_, doc)| doc.seq);

    let total = entries.len();
    let results: Vec<Value> = entries
        .into_iter()
        .take(limit)
        .map(|(id, doc)| {
            let mut change = json!({
                "seq": format!("{}-fake", doc.seq),
                "id": id,
                "changes": [{"rev": doc.rev()}]
            });
            if doc.deleted {
                change["deleted"] = json!(true);
            }
            if include_docs {
                change["doc"] = doc.to_json(id);
            }
            change
        })
        .collect();

    let last_seq = results
        .last()
        .map(|c| c["seq"].clone())
        .unwrap_or_else(|| json!(format!("{since}-fake")));
    let pending = total - results.len();
    reply(
        200,
        json!({"results": results, "last_seq": last_seq, "pending": pending}),
    )
}

/// `by_<field>` emits `[doc[field], null]` for every live document having it
fn run_view(database: &Database, view: &str, params: &HashMap<String, String>) -> ResponseTemplate {
    let Some(field) = view.strip_prefix("by_") else {
        return not_found("missing_named_view");
    };
    let key = json_param(params, "key");
    let include_docs = params.get("include_docs").is_some_and(|v| v == "true");
    let skip = usize_param(params, "skip").unwrap_or(0);
    let limit = usize_param(params, "limit").unwrap_or(usize::MAX);

    let mut emitted: Vec<(Value, &String, &StoredDoc)> = database
        .live()
        .filter(|(id, _)| !id.starts_with("_design/"))
        .filter_map(|(id, doc)| {
            let value = doc.body.get(field).filter(|v| !v.is_null())?;
            Some((value.clone(), id, doc))
        })
        .filter(|(value, _, _)| key.as_ref().map_or(true, |k| json_eq(value, k)))
        .collect();
    emitted.sort_by(|a, b| collate(&a.0, &b.0).then_with(|| a.1.cmp(b.1)));

    let total = emitted.len();
    let rows: Vec<Value> = emitted
        .into_iter()
        .skip(skip)
        .take(limit)
        .map(|(value, id, doc)| {
            let mut row = json!({"id": id, "key": value, "value": null});
            if include_docs {
                row["doc"] = doc.to_json(id);
            }
            row
        })
        .collect();
    reply(200, json!({"total_rows": total, "offset": skip, "rows": rows}))
}

// ============================================================================
// Mango matching
// ============================================================================

/// Evaluate a Mango selector against a document
pub fn matches(selector: &Value, doc: &Map<String, Value>) -> bool {
    let Some(clauses) = selector.as_object() else {
        return false;
    };
    clauses.iter().all(|(key, condition)| match key.as_str() {
        "$and" => condition
            .as_array()
            .is_some_and(|all| all.iter().all(|s| matches(s, doc))),
        "$or" => condition
            .as_array()
            .is_some_and(|any| any.iter().any(|s| matches(s, doc))),
        "$nor" => condition
            .as_array()
            .is_some_and(|none| !none.iter().any(|s| matches(s, doc))),
        "$not" => !matches(condition, doc),
        field => field_matches(lookup(doc, field), condition),
    })
}

fn lookup<'a>(doc: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    let mut parts = field.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn field_matches(value: Option<&Value>, condition: &Value) -> bool {
    match condition.as_object() {
        Some(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => ops
            .iter()
            .all(|(op, arg)| operator_matches(value, op, arg)),
        _ => value.is_some_and(|v| json_eq(v, condition)),
    }
}

fn operator_matches(value: Option<&Value>, op: &str, arg: &Value) -> bool {
    match op {
        "$exists" => value.is_some() == arg.as_bool().unwrap_or(true),
        "$type" => value.is_some_and(|v| Some(type_name(v)) == arg.as_str()),
        "$not" => !field_matches(value, arg),
        _ => {
            let Some(value) = value else {
                return false;
            };
            match op {
                "$eq" => json_eq(value, arg),
                "$ne" => !json_eq(value, arg),
                "$gt" => collate(value, arg) == Ordering::Greater,
                "$gte" => collate(value, arg) != Ordering::Less,
                "$lt" => collate(value, arg) == Ordering::Less,
                "$lte" => collate(value, arg) != Ordering::Greater,
                "$in" => arg
                    .as_array()
                    .is_some_and(|options| options.iter().any(|o| json_eq(value, o))),
                "$nin" => arg
                    .as_array()
                    .is_some_and(|options| !options.iter().any(|o| json_eq(value, o))),
                "$regex" => match (value.as_str(), arg.as_str().map(Regex::new)) {
                    (Some(text), Some(Ok(re))) => re.is_match(text),
                    _ => false,
                },
                _ => false,
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// View collation: type rank first, then value
fn collate(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a)
            .cmp(&type_rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}
