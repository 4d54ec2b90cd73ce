// Integration tests for the ingest endpoints (/push, /api/anchors) and read-only views

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;
use tower::ServiceExt;
use uwb_live::api::{create_ingest_router, IngestAppState};
use uwb_live::config::WorldConfig;
use uwb_live::state::{Point3, StateStore};
use uwb_live::zone::{ForbiddenZone, ZoneRegistry, ZoneSize};

fn create_test_app() -> (Router, Arc<StateStore>) {
    let store = Arc::new(StateStore::new(&WorldConfig::default(), 16));
    let zones = Arc::new(ZoneRegistry::with_zones([ForbiddenZone::new(
        "dock",
        Point3::new(3.0, 1.5, 3.0),
        ZoneSize::new(2.0, 3.0, 4.0),
    )]));
    let app = create_ingest_router(IngestAppState {
        store: Arc::clone(&store),
        zones,
    });
    (app, store)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_push_updates_tag_and_broadcasts() {
    let (app, store) = create_test_app();
    let mut rx = store.subscribe();

    let response = app
        .oneshot(get("/push?x=1.25&y=0.9&z=4&ts=1700000000.5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let state = store.snapshot();
    assert_eq!(state.tag.x, 1.25);
    assert_eq!(state.tag.y, 0.9);
    assert_eq!(state.tag.z, 4.0);
    assert_eq!(state.tag.timestamp, 1700000000.5);
    assert_eq!(rx.try_recv().unwrap(), state);
}

#[tokio::test]
async fn test_push_without_timestamp_uses_now() {
    let (app, store) = create_test_app();

    let response = app.oneshot(get("/push?x=1&y=1&z=1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.snapshot().tag.timestamp > 1_600_000_000.0);
}

#[tokio::test]
async fn test_push_missing_coordinate_is_rejected() {
    let (app, store) = create_test_app();
    let before = store.snapshot();
    let mut rx = store.subscribe();

    let response = app.oneshot(get("/push?x=1&z=1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "missing y coordinate");

    assert_eq!(store.snapshot(), before);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_push_non_numeric_coordinate_is_rejected() {
    let (app, store) = create_test_app();
    let before = store.snapshot();

    for uri in ["/push?x=abc&y=1&z=1", "/push?x=1&y=NaN&z=1", "/push?x=1&y=1&z=inf"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
    assert_eq!(store.snapshot(), before);
    assert_eq!(store.revision(), 0);
}

#[tokio::test]
async fn test_push_duplicate_key_returns_json_error() {
    let (app, store) = create_test_app();

    let response = app.oneshot(get("/push?x=1&x=2&y=1&z=1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["content-type"], "application/json");
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("duplicate field"));
    assert_eq!(store.revision(), 0);
}

#[tokio::test]
async fn test_anchor_batch_partial_failure() {
    let (app, store) = create_test_app();
    let mut rx = store.subscribe();

    let response = app
        .oneshot(post_json(
            "/api/anchors",
            r#"{"A0": {"x": 0.05, "y": 2.0, "z": -0.02}, "A1": {"x": 12.0, "y": null, "z": 0.0}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["applied"], serde_json::json!(["A0"]));
    assert_eq!(body["skipped"][0]["id"], "A1");

    let state = store.snapshot();
    assert_eq!(state.anchors["A0"], Point3::new(0.05, 2.0, -0.02));
    assert_eq!(rx.try_recv().unwrap(), state);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_anchor_batch_must_be_object() {
    let (app, store) = create_test_app();

    let response = app
        .clone()
        .oneshot(post_json("/api/anchors", "[1, 2, 3]"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json("/api/anchors", "not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.revision(), 0);
}

#[tokio::test]
async fn test_get_state_returns_snapshot() {
    let (app, store) = create_test_app();

    let response = app.oneshot(get("/api/state")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body, serde_json::to_value(store.snapshot()).unwrap());
    assert_eq!(body["anchors"]["A2"]["z"], 12.0);
}

#[tokio::test]
async fn test_get_zones_lists_mirror() {
    let (app, _) = create_test_app();

    let response = app.oneshot(get("/api/zones")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body[0]["id"], "dock");
    assert_eq!(body[0]["size"]["h"], 3.0);
}
