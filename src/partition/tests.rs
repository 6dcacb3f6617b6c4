//! Partition planning tests

use super::*;
use crate::config::{ConnectionConfig, Endpoint, ReadOptions};
use crate::query::{translate, Filter, QueryDescriptor, TranslatedQuery};
use crate::schema::{infer_schema, Schema};
use crate::store::{CouchClient, KeyRange};
use serde_json::json;
use test_case::test_case;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> CouchClient {
    let mut config = ConnectionConfig::from_url(&server.uri()).unwrap();
    config.http.max_retries = 0;
    CouchClient::from_config(&config).unwrap()
}

fn schema() -> Schema {
    infer_schema(&[json!({"_id": "a", "_rev": "1-a", "n": 1})]).unwrap()
}

fn query(descriptor: QueryDescriptor) -> TranslatedQuery {
    translate(&descriptor, &schema()).unwrap()
}

fn key(s: &str) -> Option<String> {
    Some(s.to_string())
}

fn probe_row(id: &str) -> serde_json::Value {
    json!({"rows": [{"id": id, "key": id, "value": {"rev": "1-x"}}]})
}

async fn mount_doc_count(server: &MockServer, count: u64) {
    Mock::given(method("GET"))
        .and(path("/db"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "db_name": "db", "doc_count": count
        })))
        .mount(server)
        .await;
}

async fn mount_probe(server: &MockServer, skip: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/db/_all_docs"))
        .and(query_param("skip", skip))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

// ============================================================================
// Pure helpers
// ============================================================================

#[test_case(100, 4 => vec![25, 50, 75]; "even split")]
#[test_case(10, 3 => vec![3, 6]; "rounds down")]
#[test_case(3, 8 => vec![1, 2]; "more partitions than documents")]
#[test_case(0, 4 => Vec::<u64>::new(); "empty database")]
#[test_case(10, 1 => Vec::<u64>::new(); "single partition")]
fn test_boundary_offsets(count: u64, partitions: usize) -> Vec<u64> {
    boundary_offsets(count, partitions)
}

#[test]
fn test_split_range_covers_without_overlap() {
    let range = KeyRange {
        start: key("a"),
        end: key("z"),
        inclusive_end: true,
    };
    let parts = split_range(&range, &["f".to_string(), "m".to_string()]);

    assert_eq!(
        parts,
        vec![
            KeyRange::half_open(key("a"), key("f")),
            KeyRange::half_open(key("f"), key("m")),
            KeyRange {
                start: key("m"),
                end: key("z"),
                inclusive_end: true,
            },
        ]
    );

    for id in ["a", "c", "f", "g", "m", "q", "z"] {
        let owners = parts.iter().filter(|r| r.contains(id)).count();
        assert_eq!(owners, 1, "key {id} owned by {owners} partitions");
    }
}

#[test]
fn test_split_range_without_boundaries() {
    let range = KeyRange::half_open(None, key("k"));
    assert_eq!(split_range(&range, &[]), vec![range]);
}

// ============================================================================
// Planning
// ============================================================================

#[tokio::test]
async fn test_all_docs_probes_boundaries() {
    let server = MockServer::start().await;
    mount_doc_count(&server, 100).await;
    mount_probe(&server, "25", probe_row("d025")).await;
    mount_probe(&server, "50", probe_row("d050")).await;
    mount_probe(&server, "75", probe_row("d075")).await;

    let client = client_for(&server);
    let plan = PartitionPlanner::new(&client, "db")
        .plan(&query(QueryDescriptor::new(Endpoint::AllDocs)), 4)
        .await
        .unwrap();

    let ranges: Vec<KeyRange> = plan
        .iter()
        .map(|p| p.scope.key_range().cloned().unwrap())
        .collect();
    assert_eq!(
        ranges,
        vec![
            KeyRange::half_open(None, key("d025")),
            KeyRange::half_open(key("d025"), key("d050")),
            KeyRange::half_open(key("d050"), key("d075")),
            KeyRange::half_open(key("d075"), None),
        ]
    );
    assert_eq!(
        plan.iter().map(|p| p.index).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );
}

#[tokio::test]
async fn test_duplicate_and_missing_boundaries_collapse() {
    let server = MockServer::start().await;
    mount_doc_count(&server, 4).await;
    mount_probe(&server, "1", probe_row("b")).await;
    mount_probe(&server, "2", probe_row("b")).await;
    mount_probe(&server, "3", json!({"rows": []})).await;

    let client = client_for(&server);
    let plan = PartitionPlanner::new(&client, "db")
        .plan(&query(QueryDescriptor::new(Endpoint::AllDocs)), 4)
        .await
        .unwrap();

    assert_eq!(plan.len(), 2);
    assert_eq!(
        plan.get(1).unwrap().scope,
        PartitionScope::KeyRange(KeyRange::half_open(key("b"), None))
    );
}

#[tokio::test]
async fn test_boundaries_stay_inside_id_range() {
    let server = MockServer::start().await;
    mount_doc_count(&server, 2).await;
    mount_probe(&server, "1", probe_row("m")).await;

    let descriptor = QueryDescriptor::new(Endpoint::AllDocs)
        .with_filters(vec![Filter::ge("_id", "m"), Filter::le("_id", "p")]);
    let client = client_for(&server);
    let plan = PartitionPlanner::new(&client, "db")
        .plan(&query(descriptor), 2)
        .await
        .unwrap();

    assert_eq!(
        plan.partitions.iter().map(|p| p.scope.clone()).collect::<Vec<_>>(),
        vec![PartitionScope::KeyRange(KeyRange {
            start: key("m"),
            end: key("p"),
            inclusive_end: true,
        })]
    );
}

#[tokio::test]
async fn test_unknown_count_uses_single_partition() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/db"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"db_name": "db"})))
        .mount(&server)
        .await;
    Mock::given(path("/db/_all_docs"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let plan = PartitionPlanner::new(&client, "db")
        .plan(&query(QueryDescriptor::new(Endpoint::AllDocs)), 8)
        .await
        .unwrap();

    assert_eq!(plan, PartitionPlan::single(PartitionScope::KeyRange(KeyRange::full())));
}

#[tokio::test]
async fn test_empty_range_skips_probing() {
    let server = MockServer::start().await;
    let descriptor = QueryDescriptor::new(Endpoint::AllDocs)
        .with_filters(vec![Filter::gt("_id", "z"), Filter::lt("_id", "a")]);

    let client = client_for(&server);
    let plan = PartitionPlanner::new(&client, "db")
        .plan(&query(descriptor), 4)
        .await
        .unwrap();

    assert_eq!(plan.len(), 1);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_changes_is_sequential() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    let plan = PartitionPlanner::new(&client, "db")
        .plan(&query(QueryDescriptor::new(Endpoint::Changes)), 16)
        .await
        .unwrap();

    assert_eq!(plan, PartitionPlan::single(PartitionScope::Sequence { since: None }));
}

#[test_case(ReadOptions::new().with_selector(r#"{"n": 1}"#); "selector")]
#[test_case(ReadOptions::new().with_view("_design/d/_view/v"); "view")]
#[test_case(ReadOptions::new().with_index("_design/d/_search/s"); "search")]
#[tokio::test]
async fn test_other_modes_use_one_partition(options: ReadOptions) {
    let server = MockServer::start().await;
    let client = client_for(&server);

    let descriptor = QueryDescriptor::from_options(&options, Endpoint::AllDocs);
    let plan = PartitionPlanner::new(&client, "db")
        .plan(&query(descriptor), 8)
        .await
        .unwrap();

    assert_eq!(plan, PartitionPlan::single(PartitionScope::Whole));
    assert!(server.received_requests().await.unwrap().is_empty());
}
