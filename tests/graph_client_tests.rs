//! Graph client pagination and throttling retry tests.

mod common;

use std::time::Instant;

use common::*;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use entra_inventory::Error;

#[tokio::test]
async fn pagination_drains_all_pages_in_link_order() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    // Three pages of sizes 2, 3, 1 chained by continuation links.
    let pages = vec![
        ResponseTemplate::new(200).set_body_json(odata_page(
            vec![json!({"id": "sp-0"}), json!({"id": "sp-1"})],
            Some(&format!(
                "{}/v1.0/servicePrincipals?$skiptoken=page2",
                server.uri()
            )),
        )),
        ResponseTemplate::new(200).set_body_json(odata_page(
            vec![
                json!({"id": "sp-2"}),
                json!({"id": "sp-3"}),
                json!({"id": "sp-4"}),
            ],
            Some(&format!(
                "{}/v1.0/servicePrincipals?$skiptoken=page3",
                server.uri()
            )),
        )),
        ResponseTemplate::new(200).set_body_json(odata_page(vec![json!({"id": "sp-5"})], None)),
    ];

    Mock::given(method("GET"))
        .and(path("/v1.0/servicePrincipals"))
        .respond_with(SequenceResponder::new(pages))
        .expect(3)
        .mount(&server)
        .await;

    let client = graph_client(&server);
    let items = client
        .paginate("/servicePrincipals", Vec::new(), Vec::new())
        .collect_all()
        .await
        .unwrap();

    assert_eq!(items.len(), 6);
    for (index, item) in items.iter().enumerate() {
        assert_eq!(item["id"], format!("sp-{index}"));
    }
}

#[tokio::test]
async fn pagination_cursor_reports_exhaustion() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1.0/servicePrincipals"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(odata_page(vec![json!({"id": "sp-0"})], None)),
        )
        .mount(&server)
        .await;

    let client = graph_client(&server);
    let mut cursor = client.paginate("/servicePrincipals", Vec::new(), Vec::new());

    assert!(cursor.has_more());
    assert_eq!(cursor.next_page().await.unwrap().unwrap().len(), 1);
    assert!(!cursor.has_more());
    assert!(cursor.next_page().await.unwrap().is_none());
}

#[tokio::test]
async fn query_params_only_sent_on_first_request() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    // First request carries $top; the continuation URL is followed verbatim
    // at a different path with no query parameters added.
    Mock::given(method("GET"))
        .and(path("/v1.0/servicePrincipals"))
        .and(query_param("$top", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(odata_page(
            vec![json!({"id": "sp-0"}), json!({"id": "sp-1"})],
            Some(&format!("{}/v1.0/continuation-marker", server.uri())),
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/continuation-marker"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(odata_page(vec![json!({"id": "sp-2"})], None)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = graph_client(&server);
    let items = client
        .paginate(
            "/servicePrincipals",
            vec![("$top".to_string(), "2".to_string())],
            Vec::new(),
        )
        .collect_all()
        .await
        .unwrap();

    assert_eq!(items.len(), 3);

    let continuation_requests: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/v1.0/continuation-marker")
        .collect();
    assert_eq!(continuation_requests.len(), 1);
    assert!(continuation_requests[0].url.query().is_none());
}

#[tokio::test]
async fn requests_carry_bearer_token_and_accept_header() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1.0/organization"))
        .and(header("Authorization", "Bearer test-access-token"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = graph_client(&server);
    let body = client.get("/organization", &[], &[], false).await.unwrap();
    assert!(body["value"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn extra_headers_merged_over_defaults() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1.0/auditLogs/signIns"))
        .and(header("ConsistencyLevel", "eventual"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = graph_client(&server);
    client
        .get(
            "/auditLogs/signIns",
            &[],
            &[("ConsistencyLevel".to_string(), "eventual".to_string())],
            false,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn throttled_request_waits_retry_after_then_succeeds() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    let responses = vec![
        ResponseTemplate::new(429).insert_header("Retry-After", "1"),
        ResponseTemplate::new(200).set_body_json(json!({"value": [{"id": "sp-0"}]})),
    ];

    Mock::given(method("GET"))
        .and(path("/v1.0/servicePrincipals"))
        .respond_with(SequenceResponder::new(responses))
        .expect(2)
        .mount(&server)
        .await;

    let client = graph_client(&server);
    let started = Instant::now();
    let body = client
        .get("/servicePrincipals", &[], &[], false)
        .await
        .unwrap();

    assert!(started.elapsed().as_millis() >= 1000);
    assert_eq!(body["value"][0]["id"], "sp-0");
}

#[tokio::test]
async fn retries_exhausted_without_extra_attempt() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    // Five consecutive 429s against a budget of five: no sixth attempt.
    let throttle = ResponseTemplate::new(429)
        .insert_header("Retry-After", "0")
        .set_body_string("throttled");
    let responder = SequenceResponder::new(vec![throttle]);
    let counter = responder.counter();

    Mock::given(method("GET"))
        .and(path("/v1.0/servicePrincipals"))
        .respond_with(responder)
        .expect(5)
        .mount(&server)
        .await;

    let client = graph_client(&server);
    let err = client
        .get("/servicePrincipals", &[], &[], false)
        .await
        .unwrap_err();

    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 5);
    match err {
        Error::Api { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "throttled");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn service_unavailable_is_retried() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    let responses = vec![
        ResponseTemplate::new(503).insert_header("Retry-After", "0"),
        ResponseTemplate::new(200).set_body_json(json!({"value": []})),
    ];

    Mock::given(method("GET"))
        .and(path("/v1.0/servicePrincipals"))
        .respond_with(SequenceResponder::new(responses))
        .expect(2)
        .mount(&server)
        .await;

    let client = graph_client(&server);
    client
        .get("/servicePrincipals", &[], &[], false)
        .await
        .unwrap();
}

#[tokio::test]
async fn non_retryable_status_fails_immediately() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1.0/servicePrincipals"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let client = graph_client(&server);
    let err = client
        .get("/servicePrincipals", &[], &[], false)
        .await
        .unwrap_err();

    match err {
        Error::Api { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "bad request");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn token_failure_is_an_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/{TEST_TENANT}/oauth2/v2.0/token")))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid client secret"))
        .mount(&server)
        .await;

    let client = graph_client(&server);
    let err = client
        .get("/servicePrincipals", &[], &[], false)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(_)));
}
