//! Integration tests for the speech server

mod common;

use std::io::Cursor;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;

async fn get(router: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app(true, false);
    let (status, body) = get(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");

    let (status, _) = get(&app.router, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_request_id_header() {
    let app = create_test_app(true, false);
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_speak_returns_previous_audio() {
    let app = create_test_app(true, false);

    let (status, first) = post_json(&app.router, "/speak", json!({ "text": "one", "callerUid": 10123 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["cachedBytes"], 0);
    assert_eq!(first["caller"], "com.example.reader");
    assert!(first["audioBase64"].is_null());

    app.state.coordinator.wait_until_idle().await.unwrap();

    let (status, second) = post_json(&app.router, "/speak", json!({ "text": "two", "callerUid": 10123 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cachedBytes"], FRAMES * 2);
    assert_eq!(second["sampleRate"], 24_000);
    assert_eq!(second["durationMs"], 100);

    let wav = general_purpose::STANDARD
        .decode(second["audioBase64"].as_str().unwrap())
        .unwrap();
    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    assert_eq!(reader.spec().sample_rate, 24_000);
    assert_eq!(reader.len() as usize, FRAMES);

    let (_, status_body) = get(&app.router, "/status").await;
    let status_json: Value = serde_json::from_slice(&status_body).unwrap();
    assert_eq!(status_json["title"], "Playing");
    assert_eq!(status_json["detail"], "one");
}

#[tokio::test]
async fn test_privileged_caller_gets_fresh_audio() {
    let app = create_test_app(true, false);

    let (status, body) = post_json(&app.router, "/speak", json!({ "text": "Battery low", "callerUid": 1000 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["caller"], "system");
    assert_eq!(body["cachedBytes"], 0);
    assert_eq!(body["freshBytes"], FRAMES * 2);
    assert!(body["audioBase64"].is_string());
}

#[tokio::test]
async fn test_speak_text_too_long() {
    let app = create_test_app(true, false);
    let (status, body) = post_json(&app.router, "/speak", json!({ "text": "a".repeat(6000) })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert_eq!(app.backend.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_blank_text_is_accepted() {
    let app = create_test_app(true, false);
    let (status, body) = post_json(&app.router, "/speak", json!({ "text": "  " })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["audioBase64"].is_null());
}

#[tokio::test]
async fn test_speak_without_enabled_profile() {
    let app = create_test_app(false, false);
    let (status, body) = post_json(&app.router, "/speak", json!({ "text": "Hello" })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], tts_core::NO_PROFILE_DETAIL);
}

#[tokio::test]
async fn test_backend_failure_is_silent() {
    let app = create_test_app(true, true);
    let (status, body) = post_json(&app.router, "/speak", json!({ "text": "Hello", "callerUid": 0 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["freshBytes"], 0);
    assert!(body["audioBase64"].is_null());
}

#[tokio::test]
async fn test_stop_drops_cached_audio() {
    let app = create_test_app(true, false);
    post_json(&app.router, "/speak", json!({ "text": "one" })).await;
    app.state.coordinator.wait_until_idle().await.unwrap();

    let (status, body) = post_json(&app.router, "/stop", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stopped"], true);

    let (_, body) = post_json(&app.router, "/speak", json!({ "text": "two" })).await;
    assert_eq!(body["cachedBytes"], 0);
}

#[tokio::test]
async fn test_list_profiles() {
    let app = create_test_app(true, false);
    let (status, body) = get(&app.router, "/profiles").await;
    assert_eq!(status, StatusCode::OK);
    let profiles: Vec<Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0]["voice"]["name"], "zh-CN-XiaoxiaoNeural");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = create_test_app(true, false);
    post_json(&app.router, "/speak", json!({ "text": "Hello", "callerUid": 1000 })).await;

    let (status, body) = get(&app.router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let metrics: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(metrics["speak"]["request_count"], 1);
    assert_eq!(metrics["deliveries"]["fresh_deliveries"], 1);
    assert_eq!(metrics["system"]["request_count"], 1);
}
