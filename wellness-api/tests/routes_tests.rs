//! Router tests against in-memory stores.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wellness_api::{create_api_router, AppState, HealthReporter};
use wellness_core::{ClientRecord, NewClient, SearchDocument};
use wellness_events::{EventPublisher, InMemoryBroker, PublisherConfig, PublisherHandle};
use wellness_storage::{
    ClientRepository, InMemoryCache, InMemoryClientRepository, InMemorySearchIndex, SearchIndex,
};
use wellness_test_utils::fixtures::{sample_client, sample_new_client};

struct TestApp {
    router: Router,
    repository: InMemoryClientRepository,
    search: InMemorySearchIndex,
    broker: InMemoryBroker,
    publisher: PublisherHandle,
}

fn test_app() -> TestApp {
    let repository = InMemoryClientRepository::new();
    let cache = InMemoryCache::new();
    let search = InMemorySearchIndex::new();
    let broker = InMemoryBroker::new("client_events", 1);

    let (publisher, handle) =
        EventPublisher::start(Arc::new(broker.clone()), PublisherConfig::default());
    let health = HealthReporter::new(
        Arc::new(repository.clone()),
        Arc::new(cache),
        Arc::new(search.clone()),
        Arc::new(broker.clone()),
        publisher.metrics(),
        Duration::from_secs(2),
    );
    let state = AppState {
        repository: Arc::new(repository.clone()),
        search: Arc::new(search.clone()),
        publisher,
        health: Arc::new(health),
    };

    TestApp {
        router: create_api_router(state),
        repository,
        search,
        broker,
        publisher: handle,
    }
}

fn json_request(method: &str, uri: &str, body: &NewClient) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(body).expect("draft should serialize"),
        ))
        .expect("request should build")
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

#[tokio::test]
async fn test_create_returns_created_and_publishes() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/api/v1/clients", &sample_new_client(1)))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::CREATED);

    let created: ClientRecord =
        serde_json::from_value(body_json(response).await).expect("body should be a client");
    assert_eq!(created.email, "client1@example.com");
    assert_eq!(app.repository.len().await, 1);

    let snapshot = app.publisher.shutdown().await;
    assert_eq!(snapshot.sent, 1);
    assert_eq!(app.broker.len().await, 1);
}

#[tokio::test]
async fn test_create_rejects_invalid_draft() {
    let app = test_app();
    let draft = NewClient::new("", "not-an-email", "+10000000000");

    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/api/v1/clients", &draft))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.repository.is_empty().await);

    let snapshot = app.publisher.shutdown().await;
    assert_eq!(snapshot.enqueued, 0);
}

#[tokio::test]
async fn test_create_duplicate_email_conflicts() {
    let app = test_app();
    let draft = sample_new_client(7);

    let first = app
        .router
        .clone()
        .oneshot(json_request("POST", "/api/v1/clients", &draft))
        .await
        .expect("request should complete");
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .router
        .clone()
        .oneshot(json_request("POST", "/api/v1/clients", &draft))
        .await
        .expect("request should complete");
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let body = body_json(second).await;
    assert_eq!(body["code"], "CLIENT_ALREADY_EXISTS");
}

#[tokio::test]
async fn test_get_reads_system_of_record() {
    let app = test_app();
    app.repository
        .insert(&sample_client(3))
        .await
        .expect("insert should succeed");

    let response = app
        .router
        .clone()
        .oneshot(empty_request("GET", "/api/v1/clients/3"))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], 3);
}

#[tokio::test]
async fn test_get_missing_client_is_not_found() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(empty_request("GET", "/api/v1/clients/42"))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["code"], "CLIENT_NOT_FOUND");
}

#[tokio::test]
async fn test_update_replaces_fields() {
    let app = test_app();
    app.repository
        .insert(&sample_client(2))
        .await
        .expect("insert should succeed");

    let mut draft = sample_new_client(2);
    draft.full_name = "Renamed Client".to_string();
    let response = app
        .router
        .clone()
        .oneshot(json_request("PUT", "/api/v1/clients/2", &draft))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::OK);

    let stored = app
        .repository
        .get(2)
        .await
        .expect("get should succeed")
        .expect("row should exist");
    assert_eq!(stored.full_name, "Renamed Client");

    let snapshot = app.publisher.shutdown().await;
    assert_eq!(snapshot.sent, 1);
}

#[tokio::test]
async fn test_update_missing_client_is_not_found() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(json_request("PUT", "/api/v1/clients/9", &sample_new_client(9)))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let snapshot = app.publisher.shutdown().await;
    assert_eq!(snapshot.enqueued, 0);
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    let app = test_app();
    app.repository
        .insert(&sample_client(4))
        .await
        .expect("insert should succeed");

    let response = app
        .router
        .clone()
        .oneshot(empty_request("DELETE", "/api/v1/clients/4"))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .router
        .clone()
        .oneshot(empty_request("GET", "/api/v1/clients/4"))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .clone()
        .oneshot(empty_request("DELETE", "/api/v1/clients/4"))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let snapshot = app.publisher.shutdown().await;
    assert_eq!(snapshot.sent, 1);
}

#[tokio::test]
async fn test_search_requires_query() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(empty_request("GET", "/api/v1/clients/search"))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_reads_index() {
    let app = test_app();
    let client = sample_client(5);
    app.search
        .index(client.id, &SearchDocument::from(&client))
        .await
        .expect("index should succeed");

    let response = app
        .router
        .clone()
        .oneshot(empty_request("GET", "/api/v1/clients/search?q=engineer"))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let hits = body.as_array().expect("hits should be an array");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["id"], 5);
}

#[tokio::test]
async fn test_health_is_ok_with_in_memory_stores() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(empty_request("GET", "/api/v1/health"))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["checks"].as_array().map(Vec::len), Some(4));
}
