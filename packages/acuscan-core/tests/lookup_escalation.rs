//! Integration tests for the escalating lookup against a stub ERP server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use acuscan_core::erp::client::{AuthMode, ErpClient};
use acuscan_core::erp::lookup::{resolve, LookupError, SearchStrategy, DEFAULT_LOOKUP_BUDGET};

const API_VERSION: &str = "24.200.001";
const ITEM_PATH: &str = "/entity/Default/24.200.001/StockItem";

fn client_for(server: &MockServer) -> ErpClient {
    ErpClient::new(
        &server.uri(),
        "Company",
        API_VERSION,
        AuthMode::Bearer("test-token".to_string()),
    )
    .unwrap()
}

fn item_envelope(inventory_id: &str) -> serde_json::Value {
    json!({
        "value": [
            {
                "InventoryID": { "value": inventory_id },
                "Description": { "value": "Test item" }
            }
        ]
    })
}

fn empty_envelope() -> serde_json::Value {
    json!({ "value": [] })
}

/// A request's decoded `$filter` value, if any.
fn filter_of(request: &wiremock::Request) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == "$filter")
        .map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn exact_match_resolves_in_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ITEM_PATH))
        .and(query_param("$filter", "InventoryID eq 'AALEGO500'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(item_envelope("AALEGO500")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let hit = resolve(&client, "AALEGO500", DEFAULT_LOOKUP_BUDGET)
        .await
        .unwrap();

    assert_eq!(hit.strategy, SearchStrategy::Exact);
    assert_eq!(hit.item.inventory_id(), "AALEGO500");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    // Warehouse rows are expanded inline on every step
    let expand = requests[0]
        .url
        .query_pairs()
        .find(|(k, _)| k == "$expand")
        .map(|(_, v)| v.into_owned());
    assert_eq!(expand.as_deref(), Some("WarehouseDetails"));
}

#[tokio::test]
async fn empty_exact_escalates_to_contains() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ITEM_PATH))
        .and(query_param("$filter", "InventoryID eq 'X001'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_envelope()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ITEM_PATH))
        .and(query_param("$filter", "contains(InventoryID, 'X001')"))
        .respond_with(ResponseTemplate::new(200).set_body_json(item_envelope("BX001A")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let hit = resolve(&client, "X001", DEFAULT_LOOKUP_BUDGET).await.unwrap();

    assert_eq!(hit.strategy, SearchStrategy::Contains);
    assert_eq!(hit.item.inventory_id(), "BX001A");

    // Strategy order: exact first, contains second, nothing after the hit
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(filter_of(&requests[0]).unwrap(), "InventoryID eq 'X001'");
    assert_eq!(filter_of(&requests[1]).unwrap(), "contains(InventoryID, 'X001')");
}

#[tokio::test]
async fn quotes_in_identifier_are_doubled_in_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ITEM_PATH))
        .and(query_param("$filter", "InventoryID eq 'O''Brien-1'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(item_envelope("O'Brien-1")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let hit = resolve(&client, "O'Brien-1", DEFAULT_LOOKUP_BUDGET)
        .await
        .unwrap();

    assert_eq!(hit.strategy, SearchStrategy::Exact);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn unauthorized_aborts_escalation_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ITEM_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = resolve(&client, "ABC", DEFAULT_LOOKUP_BUDGET)
        .await
        .unwrap_err();

    assert!(matches!(err, LookupError::AuthExpired));
    // No further strategies were attempted after the rejection
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn not_found_on_early_step_still_escalates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ITEM_PATH))
        .and(query_param("$filter", "InventoryID eq 'K9'"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ITEM_PATH))
        .and(query_param("$filter", "contains(InventoryID, 'K9')"))
        .respond_with(ResponseTemplate::new(200).set_body_json(item_envelope("DOGK9")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let hit = resolve(&client, "K9", DEFAULT_LOOKUP_BUDGET).await.unwrap();

    assert_eq!(hit.strategy, SearchStrategy::Contains);
}

#[tokio::test]
async fn bare_array_response_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ITEM_PATH))
        .and(query_param("$filter", "InventoryID eq 'RAW1'"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "InventoryID": { "value": "RAW1" } }])),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let hit = resolve(&client, "RAW1", DEFAULT_LOOKUP_BUDGET).await.unwrap();

    assert_eq!(hit.strategy, SearchStrategy::Exact);
    assert_eq!(hit.item.inventory_id(), "RAW1");
}

#[tokio::test]
async fn full_scan_matches_case_insensitively() {
    let server = MockServer::start().await;
    // Every filtered strategy returns nothing
    for filter in [
        "InventoryID eq 'aacomput01'",
        "contains(InventoryID, 'aacomput01')",
        "startswith(InventoryID, 'aacomput01')",
    ] {
        Mock::given(method("GET"))
            .and(path(ITEM_PATH))
            .and(query_param("$filter", filter))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_envelope()))
            .mount(&server)
            .await;
    }
    // The unfiltered fetch returns the whole catalog
    Mock::given(method("GET"))
        .and(path(ITEM_PATH))
        .and(query_param_is_missing("$filter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "InventoryID": { "value": "ZZOTHER" } },
                { "InventoryID": { "value": "AACOMPUT01" } }
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let hit = resolve(&client, "aacomput01", DEFAULT_LOOKUP_BUDGET)
        .await
        .unwrap();

    assert_eq!(hit.strategy, SearchStrategy::FullScan);
    assert_eq!(hit.item.inventory_id(), "AACOMPUT01");
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn not_found_on_final_step_is_terminal() {
    let server = MockServer::start().await;
    // Every filtered strategy comes back empty
    for filter in [
        "InventoryID eq 'GHOST'",
        "contains(InventoryID, 'GHOST')",
        "startswith(InventoryID, 'GHOST')",
    ] {
        Mock::given(method("GET"))
            .and(path(ITEM_PATH))
            .and(query_param("$filter", filter))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_envelope()))
            .mount(&server)
            .await;
    }
    // The unfiltered fetch 404s: on the last step that is a hard miss
    Mock::given(method("GET"))
        .and(path(ITEM_PATH))
        .and(query_param_is_missing("$filter"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = resolve(&client, "GHOST", DEFAULT_LOOKUP_BUDGET)
        .await
        .unwrap_err();

    assert!(matches!(err, LookupError::NotFound));
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn undecodable_final_scan_is_a_decode_error() {
    let server = MockServer::start().await;
    // Garbage on the early steps reads as "no rows" and escalates; on the
    // final step there is nothing left to fall back to.
    Mock::given(method("GET"))
        .and(path(ITEM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = resolve(&client, "ABC", DEFAULT_LOOKUP_BUDGET)
        .await
        .unwrap_err();

    assert!(matches!(err, LookupError::Decode(_)));
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn exhausted_strategies_report_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ITEM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_envelope()))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = resolve(&client, "NOPE", DEFAULT_LOOKUP_BUDGET)
        .await
        .unwrap_err();

    assert!(matches!(err, LookupError::NotFound));
    // exact, contains, startswith, full scan
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn server_error_is_surfaced_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ITEM_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = resolve(&client, "ABC", DEFAULT_LOOKUP_BUDGET)
        .await
        .unwrap_err();

    match err {
        LookupError::Server { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected Server error, got {other:?}"),
    }
}

#[tokio::test]
async fn exhausted_budget_times_out_without_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ITEM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_envelope()))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = resolve(&client, "ABC", Duration::ZERO).await.unwrap_err();

    assert!(matches!(err, LookupError::Timeout));
    assert_eq!(server.received_requests().await.unwrap().len(), 0);
}
