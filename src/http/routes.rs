use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use rsa::RsaPrivateKey;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::store::MetricStore;

use super::{admission, encryption, handlers};

/// Shared application state reachable from every handler and middleware
/// layer: the backend, the HMAC sign key, an optional decryption key, the
/// trusted-subnet CIDR, and the supervisor's shared cancellation scope every
/// per-request store call derives its own deadline-bound child from.
pub struct AppState {
    pub store: Arc<dyn MetricStore>,
    pub sign_key: String,
    pub private_key: Option<Arc<RsaPrivateKey>>,
    pub trusted_subnet: String,
    pub cancel: CancellationToken,
}

/// Builds the full HTTP router with its middleware pipeline, outer to
/// inner: request logger, request-id tagger, real-client-IP extractor,
/// trusted-subnet admission, panic recoverer, gzip compression, RSA body
/// decryptor, route-matched request-metrics recorder, then the routes
/// themselves.
pub fn create_router(state: Arc<AppState>, prometheus: PrometheusHandle) -> Router {
    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/update/:kind/:id/:value", post(handlers::update_path))
        .route("/update/", post(handlers::update_json))
        .route("/updates/", post(handlers::update_batch))
        .route("/value/", post(handlers::value_json))
        .route("/value/:kind/:id", get(handlers::value_path))
        .route("/", get(handlers::index))
        .route(
            "/metrics",
            get(move || {
                let handle = prometheus.clone();
                async move { handle.render() }
            }),
        )
        // `route_layer`, not `layer`: `track_metrics` reads the `MatchedPath`
        // extension, which only exists once the router has matched a route —
        // a blanket `layer()` wrapping the whole router runs before that.
        .route_layer(axum::middleware::from_fn(track_metrics))
        .with_state(state.clone())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            encryption::decrypt_body,
        ))
        .layer(CompressionLayer::new())
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            admission::check_trusted_subnet,
        ))
        .layer(axum::middleware::from_fn(admission::extract_real_ip))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http().on_request(
                |request: &axum::http::Request<_>, _span: &tracing::Span| {
                    tracing::info!(method = %request.method(), path = %request.uri().path(), "request received");
                },
            ),
        )
}

/// Records request count and latency under the matched route template — the
/// ambient counterpart to the domain gauges/counters this service collects
/// on behalf of agents.
async fn track_metrics(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let start = std::time::Instant::now();
    let response = next.run(req).await;
    crate::telemetry::record_request(&route, response.status().as_u16(), start.elapsed());
    response
}
