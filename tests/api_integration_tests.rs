//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint against an in-memory
//! store and source.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use lease_cache::{
    api::create_router,
    source::MemorySource,
    store::{KeyedStore, MemoryStore},
    AppState, CacheOptions, SourceAccessor,
};
use serde_json::Value;
use tower::ServiceExt;

// == Helper Functions ==

struct TestApp {
    router: Router,
    source: Arc<MemorySource<Value>>,
    store: Arc<MemoryStore>,
}

fn create_test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MemorySource::<Value>::new());
    let state = AppState::from_parts(
        "api",
        store.clone(),
        source.clone(),
        CacheOptions::default(),
    )
    .unwrap();

    TestApp {
        router: create_router(state),
        source,
        store,
    }
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn put_json(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// == SET Endpoint Tests ==

#[tokio::test]
async fn test_set_endpoint_success() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(put_json("/set", r#"{"key":"test_key","value":"test_value"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert!(json["message"].as_str().unwrap().contains("test_key"));
}

#[tokio::test]
async fn test_set_endpoint_writes_through_to_source() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(put_json("/set", r#"{"key":"user","value":{"a":1,"b":"1"}}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = app.source.get(&["user".to_string()]).await.unwrap();
    assert_eq!(stored, Some(serde_json::json!({"a": 1, "b": "1"})));
    assert!(app
        .store
        .get_with_ttl("api:cacher:user")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_set_endpoint_empty_key() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(put_json("/set", r#"{"key":"","value":"v"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn test_set_endpoint_invalid_json() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(put_json("/set", r#"{"key":"k""#))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

// == GET Endpoint Tests ==

#[tokio::test]
async fn test_get_endpoint_success() {
    let app = create_test_app();

    let set_response = app
        .router
        .clone()
        .oneshot(put_json("/set", r#"{"key":"get_key","value":"get_value"}"#))
        .await
        .unwrap();
    assert_eq!(set_response.status(), StatusCode::OK);

    let get_response = app.router.oneshot(get("/get/get_key")).await.unwrap();

    assert_eq!(get_response.status(), StatusCode::OK);
    let json = body_to_json(get_response.into_body()).await;
    assert_eq!(json["key"].as_str().unwrap(), "get_key");
    assert_eq!(json["found"], true);
    assert_eq!(json["value"].as_str().unwrap(), "get_value");
}

#[tokio::test]
async fn test_get_endpoint_loads_from_source_on_miss() {
    let app = create_test_app();
    app.source.insert(&["seeded"], serde_json::json!(42)).await;

    let response = app.router.oneshot(get("/get/seeded")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["value"], 42);
    assert_eq!(app.source.get_calls(), 1);
}

#[tokio::test]
async fn test_get_endpoint_unknown_key() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(get("/get/nonexistent_key"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["found"], false);
    assert!(json.get("value").is_none());
}

#[tokio::test]
async fn test_get_endpoint_source_failure_on_miss() {
    let app = create_test_app();
    app.source.fail_gets(true);

    let response = app.router.oneshot(get("/get/broken")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_get_endpoint_store_offline() {
    let app = create_test_app();
    app.store.set_offline(true);

    let response = app.router.oneshot(get("/get/any")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// == DELETE Endpoint Tests ==

#[tokio::test]
async fn test_delete_endpoint_success() {
    let app = create_test_app();

    let set_response = app
        .router
        .clone()
        .oneshot(put_json("/set", r#"{"key":"delete_key","value":"delete_value"}"#))
        .await
        .unwrap();
    assert_eq!(set_response.status(), StatusCode::OK);

    let del_response = app
        .router
        .clone()
        .oneshot(delete("/del/delete_key"))
        .await
        .unwrap();
    assert_eq!(del_response.status(), StatusCode::OK);

    let get_response = app.router.oneshot(get("/get/delete_key")).await.unwrap();
    assert_eq!(get_response.status(), StatusCode::OK);
    let json = body_to_json(get_response.into_body()).await;
    assert_eq!(json["found"], false);

    // Answered from the tombstone
    assert_eq!(app.source.get_calls(), 0);
}

#[tokio::test]
async fn test_delete_endpoint_unknown_key() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(delete("/del/nonexistent_key"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

// == STATS Endpoint Tests ==

#[tokio::test]
async fn test_stats_endpoint() {
    let app = create_test_app();

    let _ = app
        .router
        .clone()
        .oneshot(put_json("/set", r#"{"key":"stats_key","value":"stats_value"}"#))
        .await
        .unwrap();

    // Hit
    let _ = app
        .router
        .clone()
        .oneshot(get("/get/stats_key"))
        .await
        .unwrap();

    // Miss
    let _ = app
        .router
        .clone()
        .oneshot(get("/get/missing_key"))
        .await
        .unwrap();

    let response = app.router.oneshot(get("/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["hits"], 1);
    assert_eq!(json["misses"], 1);
    assert_eq!(json["stale_hits"], 0);
    assert!((json["hit_rate"].as_f64().unwrap() - 0.5).abs() < 0.001);
}

// == HEALTH Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let response = app.router.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert!(json.get("timestamp").is_some());
}
