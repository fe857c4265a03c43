use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use beacon_content::ContentExtractor;
use beacon_db::Database;
use beacon_federation::{Dispatcher, FederationConfig};
use beacon_types::hasher;

use crate::routes::router;
use crate::state::AppStateInner;

struct Harness {
    app: Router,
    db: Arc<Database>,
}

impl Harness {
    fn new(allow_delete_all: bool) -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new(FederationConfig {
            self_uri: Some("http://node.example:3000/api/de".into()),
            retry_delay: std::time::Duration::ZERO,
            ..FederationConfig::default()
        })
        .unwrap();
        let state = Arc::new(AppStateInner {
            db: db.clone(),
            dispatcher,
            extractor: ContentExtractor::default(),
            archive_enabled: true,
            allow_delete_all,
        });
        Self { app: router(state), db }
    }

    async fn send(&self, method: Method, uri: &str, body: impl Into<Body>, content_type: &str) -> (StatusCode, HeaderMap, Bytes) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(body.into())
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, bytes)
    }

    async fn xml(&self, method: Method, uri: &str, body: String) -> (StatusCode, HeaderMap, Bytes) {
        self.send(method, uri, body, "text/xml").await
    }

    async fn json(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let (status, _, bytes) = self.send(method, uri, body.to_string(), "application/json").await;
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let (status, _, bytes) = self.send(Method::GET, uri, Body::empty(), "application/json").await;
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

fn envelope(kind: &str, sent: &str, keywords: &[(&str, &str)]) -> String {
    let keywords: String = keywords
        .iter()
        .map(|(urn, value)| {
            format!("<contentKeyword><valueListUrn>{urn}</valueListUrn><value>{value}</value></contentKeyword>")
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<EDXLDistribution xmlns="urn:oasis:names:tc:emergency:EDXL:DE:1.0">
  <distributionID>D1</distributionID>
  <senderID>S1</senderID>
  <dateTimeSent>{sent}</dateTimeSent>
  <distributionStatus>Test</distributionStatus>
  <distributionType>{kind}</distributionType>
  <contentObject>
    <contentDescription>engine 12</contentDescription>
    {keywords}
  </contentObject>
</EDXLDistribution>"#
    )
}

fn message_id() -> i32 {
    hasher::message_id("S1", "D1")
}

#[tokio::test]
async fn report_is_created_stored_and_archived() {
    let h = Harness::new(false);
    let body = envelope("Report", "2024-03-01T12:00:00Z", &[]);

    let (status, headers, bytes) = h.xml(Method::POST, "/api/de", body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers[header::LOCATION], format!("/api/de/{}", message_id()));
    let summary: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(summary["sender_id"], "S1");
    assert_eq!(summary["id"], message_id());

    let (status, headers, bytes) = h.send(Method::GET, &format!("/api/de/{}", message_id()), Body::empty(), "text/xml").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/xml"));
    assert_eq!(bytes, body.as_bytes());

    let archived = h.db.archive_entries(message_id()).unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].source_ip, "203.0.113.7");

    let (status, _, _) = h.xml(Method::POST, "/api/de", body).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn malformed_and_unsupported_messages_are_rejected() {
    let h = Harness::new(false);
    let (status, _, bytes) = h.xml(Method::POST, "/api/de", "<EDXLDistribution".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(err["status"], 400);

    let body = envelope("Ack", "2024-03-01T12:00:00Z", &[]);
    let (status, _, _) = h.xml(Method::POST, "/api/de", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!h.db.message_exists(message_id()).unwrap());
}

#[tokio::test]
async fn updates_are_monotonic_in_sent_time() {
    let h = Harness::new(false);
    let (status, _, _) = h.xml(Method::POST, "/api/de", envelope("Update", "2024-03-01T12:00:00Z", &[])).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, _) = h.xml(Method::POST, "/api/de", envelope("Update", "2024-03-01T13:00:00Z", &[])).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = h.xml(Method::POST, "/api/de", envelope("Update", "2024-03-01T11:00:00Z", &[])).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let stored = h.db.read_message(message_id()).unwrap();
    assert_eq!(stored.sent_at.to_rfc3339(), "2024-03-01T13:00:00+00:00");
}

#[tokio::test]
async fn put_checks_path_identity() {
    let h = Harness::new(false);
    let body = envelope("Update", "2024-03-01T12:00:00Z", &[]);

    let (status, _, _) = h.xml(Method::PUT, "/api/de/42", body.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = h.xml(Method::PUT, &format!("/api/de/{}", message_id()), body).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn cancel_marks_message_for_purge() {
    let h = Harness::new(false);
    let (status, _, _) = h.xml(Method::POST, "/api/de", envelope("Cancel", "2024-03-01T12:00:00Z", &[])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.xml(Method::POST, "/api/de", envelope("Report", "2024-03-01T12:00:00Z", &[])).await;
    let (status, _, _) = h.xml(Method::POST, "/api/de", envelope("Cancel", "2024-03-01T12:05:00Z", &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.db.read_message(message_id()).unwrap().delete_pending);

    assert_eq!(h.db.purge_delete_pending().unwrap(), 1);
    assert!(!h.db.message_exists(message_id()).unwrap());
}

#[tokio::test]
async fn list_search_and_delete() {
    let h = Harness::new(false);
    let (status, _) = h.get("/api/de").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.xml(Method::POST, "/api/de", envelope("Report", "2024-03-01T12:00:00Z", &[])).await;
    let (status, list) = h.get("/api/de").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = h.get("/api/de/search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, found) = h.get("/api/de/search?from=2024-03-01T00:00:00Z&return_type=full").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found[0]["delete_pending"], false);
    assert!(found[0]["body"].as_str().unwrap().contains("engine 12"));

    let (status, found) = h.get("/api/de/search?from=2024-03-02T00:00:00Z").await;
    assert_eq!(status, StatusCode::OK);
    assert!(found.as_array().unwrap().is_empty());

    let (status, _) = h.get("/api/de/search?from=2024-03-02T00:00:00Z&to=2024-03-01T00:00:00Z").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = h.send(Method::DELETE, "/api/de", Body::empty(), "text/xml").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/de/{}", message_id());
    let (status, _, _) = h.send(Method::DELETE, &uri, Body::empty(), "text/xml").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = h.send(Method::DELETE, &uri, Body::empty(), "text/xml").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_all_when_enabled() {
    let h = Harness::new(true);
    h.xml(Method::POST, "/api/de", envelope("Report", "2024-03-01T12:00:00Z", &[])).await;
    let (status, report) = h.json(Method::DELETE, "/api/de", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["deleted"], 1);
}

#[tokio::test]
async fn feed_rules_route_content_into_views() {
    let h = Harness::new(false);
    let (status, _) = h
        .json(Method::POST, "/api/feeds", json!({"source_id": "units", "source_value": "red", "view_name": "red_units"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, rule) = h
        .json(
            Method::POST,
            "/api/rules/feed",
            json!({
                "element_name": "contentKeyword",
                "source_id": "urn:x",
                "source_value": "red",
                "feeds": [{"id": "units", "value": "red"}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rule["id"], hasher::rule_id("urn:x", "red"));

    h.xml(Method::POST, "/api/de", envelope("Report", "2024-03-01T12:00:00Z", &[("urn:x", "red")])).await;

    let (status, rows) = h.get("/api/viewcontent/red_units").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows[0]["title"], "");
    assert_eq!(rows[0]["latitude"], 0.0);
    assert_eq!(rows[0]["longitude"], 0.0);

    let (status, feed) = h.get("/api/feeds/byviewname/red_units").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed["content_ids"][0], hasher::content_id("S1", "D1", "engine 12"));

    let (status, _) = h.get("/api/viewcontent/missing_view").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.json(Method::DELETE, "/api/rules", Value::Null).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn federation_rules_validate_destinations() {
    let h = Harness::new(false);
    let rule = |uri: &str| {
        json!({"element_name": "keyword", "source_id": "urn:x", "source_value": "red", "federation_uris": [uri]})
    };

    let (status, _) = h.json(Method::POST, "/api/rules/federation", rule("http://node.example:3000/api/de")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = h.json(Method::POST, "/api/rules/federation", rule("ftp://peer.example/")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, created) = h.json(Method::POST, "/api/rules/federation", rule("http://peer.example/api/de")).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_i64().unwrap();

    let uri = format!("/api/rules/federation/{id}?destination=http://other.example/api/de");
    let (status, updated) = h.json(Method::PUT, &uri, Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["federation_uris"].as_array().unwrap().len(), 2);

    let (status, _) = h.json(Method::DELETE, &uri, Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h.json(Method::DELETE, &uri, Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, replaced) = h
        .json(Method::PUT, &format!("/api/rules/federation/{id}"), json!(["https://third.example/de"]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["federation_uris"], json!(["https://third.example/de"]));
}

#[tokio::test]
async fn source_values_guard_active_rules() {
    let h = Harness::new(false);
    let (status, list) = h.json(Method::POST, "/api/values/list", json!({"id": "urn:x", "values": ["red", "blue"]})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(list["id"], hasher::source_list_id("urn:x"));
    assert_eq!(list["values"].as_array().unwrap().len(), 2);

    let (status, _) = h.json(Method::POST, "/api/values/value", json!({"id": "urn:x", "value": "red"})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    h.json(
        Method::POST,
        "/api/rules/feed",
        json!({"source_id": "urn:x", "source_value": "red", "feeds": [{"id": "units", "value": "red"}]}),
    )
    .await;

    let red = list["values"][0]["id"].as_i64().unwrap();
    let (status, _) = h.json(Method::DELETE, &format!("/api/values/value/{red}"), Value::Null).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let blue = list["values"][1]["id"].as_i64().unwrap();
    let (status, _) = h.json(Method::DELETE, &format!("/api/values/value/{blue}"), Value::Null).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn position_update_moves_single_content_message() {
    let h = Harness::new(false);
    h.xml(Method::POST, "/api/de", envelope("Report", "2024-03-01T12:00:00Z", &[])).await;
    let uri = format!("/api/de/position/{}", message_id());
    let patch = |lookup: i32| {
        json!({
            "lookup_id": lookup,
            "date_time_sent": "2024-03-01T14:00:00Z",
            "latitude": 30.0,
            "longitude": -81.0,
            "date_time_start": "2024-03-01T14:00:00Z",
            "date_time_stale": "2024-03-01T20:00:00Z"
        })
    };

    let (status, _) = h.json(Method::PUT, &uri, patch(7)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, summary) = h.json(Method::PUT, &uri, patch(message_id())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["id"], message_id());

    let stored = h.db.read_message(message_id()).unwrap();
    assert_eq!(stored.sent_at.to_rfc3339(), "2024-03-01T14:00:00+00:00");
    let items = h.db.content_items(message_id()).unwrap();
    assert_eq!(items[0].expires_at.to_rfc3339(), "2024-03-01T20:00:00+00:00");

    let (status, _) = h.json(Method::PUT, "/api/de/position/99", patch(99)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ingest_host_header_becomes_a_self_loop() {
    let h = Harness::new(false);
    let rule = |uri: &str| {
        json!({"element_name": "keyword", "source_id": "urn:x", "source_value": "red", "federation_uris": [uri]})
    };

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/de")
        .header(header::HOST, "Beacon.LAN:8080")
        .header(header::CONTENT_TYPE, "text/xml")
        .body(Body::from(envelope("Report", "2024-03-01T12:00:00Z", &[])))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let (status, err) = h.json(Method::POST, "/api/rules/federation", rule("http://beacon.lan:8080/api/de")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"].as_str().unwrap().contains("self-loop"));

    let (status, _) = h.json(Method::POST, "/api/rules/federation", rule("http://beacon.lan:9090/api/de")).await;
    assert_eq!(status, StatusCode::CREATED);
}
