use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::error::StoreError;
use crate::metric::{Kind, Metric};
use crate::store::{MemoryStore, MetricStore, StoreResult};

use super::routes::AppState;
use super::create_router;

fn test_app(sign_key: &str) -> axum::Router {
    test_app_with_store(sign_key, Arc::new(MemoryStore::new()))
}

fn test_app_with_store(sign_key: &str, store: Arc<dyn MetricStore>) -> axum::Router {
    let state = Arc::new(AppState {
        store,
        sign_key: sign_key.to_string(),
        private_key: None,
        trusted_subnet: String::new(),
        cancel: CancellationToken::new(),
    });
    let prometheus = crate::telemetry::install_recorder();
    create_router(state, prometheus)
}

/// A store whose every call fails, used only to exercise the `/ping`
/// 500-on-backend-failure path.
struct AlwaysFailsStore;

#[async_trait]
impl MetricStore for AlwaysFailsStore {
    async fn update_counter(&self, _id: &str, _delta: i64, _cancel: CancellationToken) -> StoreResult<()> {
        Err(always_fails())
    }
    async fn reset_counter(&self, _id: &str, _cancel: CancellationToken) -> StoreResult<()> {
        Err(always_fails())
    }
    async fn update_gauge(&self, _id: &str, _value: f64, _cancel: CancellationToken) -> StoreResult<()> {
        Err(always_fails())
    }
    async fn get_metric(&self, _id: &str, _kind: Kind, _cancel: CancellationToken) -> StoreResult<Metric> {
        Err(always_fails())
    }
    async fn get_all(&self, _cancel: CancellationToken) -> StoreResult<HashMap<String, Metric>> {
        Err(always_fails())
    }
    async fn ping(&self, _cancel: CancellationToken) -> StoreResult<()> {
        Err(always_fails())
    }
}

fn always_fails() -> StoreError {
    StoreError::Unavailable(anyhow::anyhow!("backend unreachable"))
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn read_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn ping_returns_200() {
    let resp = test_app("")
        .oneshot(
            Request::builder()
                .uri("/ping")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn update_by_url_params_then_read_back() {
    let app = test_app("");
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/update/gauge/Alloc/96969.519")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/value/gauge/Alloc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(read_text(resp).await, "96969.519");
}

#[tokio::test]
async fn ping_returns_500_when_the_store_is_unreachable() {
    let app = test_app_with_store("", Arc::new(AlwaysFailsStore));
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/ping")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn update_by_json_then_read_back() {
    let app = test_app("");
    let metric = json!({"id": "Alloc", "type": "gauge", "value": 96969.519});

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/update/")
                .header("content-type", "application/json")
                .body(Body::from(metric.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/value/")
                .header("content-type", "application/json")
                .body(Body::from(json!({"id": "Alloc", "type": "gauge"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = read_json(resp).await;
    assert_eq!(body["value"], 96969.519);
}

#[tokio::test]
async fn batch_update_applies_every_metric() {
    let app = test_app("");
    let batch = json!([
        {"id": "Alloc", "type": "gauge", "value": 1.0},
        {"id": "PollCount", "type": "counter", "delta": 3},
    ]);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/updates/")
                .header("content-type", "application/json")
                .body(Body::from(batch.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/value/counter/PollCount")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(read_text(resp).await, "3");
}

#[tokio::test]
async fn missing_metric_is_not_found() {
    let resp = test_app("")
        .oneshot(
            Request::builder()
                .uri("/value/gauge/missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_text(resp).await, "Metric not found: missing\n");
}

#[tokio::test]
async fn unimplemented_kind_is_rejected() {
    let resp = test_app("")
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/update/histogram/Alloc/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn unimplemented_kind_is_rejected_on_json_routes() {
    let app = test_app("");
    let metric = json!({"id": "Alloc", "type": "histogram", "value": 1.0});

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/update/")
                .header("content-type", "application/json")
                .body(Body::from(metric.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/value/")
                .header("content-type", "application/json")
                .body(Body::from(json!({"id": "Alloc", "type": "histogram"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn signed_update_rejects_wrong_hash_accepts_correct_hash() {
    let app = test_app("test");

    let mut bad = Metric::gauge("Alloc", 96969.519);
    bad.hash = "wrong".to_string();
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/update/")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&bad).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let mut good = Metric::gauge("Alloc", 96969.519);
    good.sign("test");
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/update/")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&good).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn index_page_renders_html() {
    let app = test_app("");
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/update/gauge/Alloc/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let resp = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = read_text(resp).await;
    assert!(body.contains("Alloc"));
}

#[tokio::test]
async fn metrics_endpoint_serves_prometheus_text() {
    let resp = test_app("")
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
