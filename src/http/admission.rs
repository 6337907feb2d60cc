use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use ipnet::IpNet;

use super::routes::AppState;

/// The client IP resolved by [`extract_real_ip`], stashed as a request
/// extension for [`check_trusted_subnet`] and any other downstream
/// consumer — the two-stage `middleware.RealIP` then `security.CheckRealIP`
/// pipeline from the original, split into its own extractor/admission pair
/// here instead of one combined function.
#[derive(Debug, Clone, Copy)]
pub struct RealIp(pub IpAddr);

/// Resolves the request's real client IP from `X-Real-IP`, falling back to
/// the first hop of a comma-separated `X-Forwarded-For` when absent —
/// matching the original's `middleware.RealIP`. Never rejects a request
/// itself; a request carrying neither header simply has no [`RealIp`]
/// extension, leaving the decision to [`check_trusted_subnet`].
pub async fn extract_real_ip(mut req: Request, next: Next) -> Response {
    let real_ip = req
        .headers()
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<IpAddr>().ok())
        .or_else(|| {
            req.headers()
                .get("X-Forwarded-For")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        });

    if let Some(ip) = real_ip {
        req.extensions_mut().insert(RealIp(ip));
    }

    next.run(req).await
}

/// Rejects requests whose real client IP (resolved upstream by
/// [`extract_real_ip`]) falls outside the configured trusted subnet. An
/// empty `trusted_subnet` disables the check entirely — matching the
/// original's `CheckRealIP`, which is a no-op when its CIDR argument is the
/// empty string.
pub async fn check_trusted_subnet(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if state.trusted_subnet.is_empty() {
        return next.run(req).await;
    }

    let net: IpNet = match state.trusted_subnet.parse() {
        Ok(net) => net,
        Err(err) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("check trusted networks: {err}"),
            )
                .into_response();
        }
    };

    match req.extensions().get::<RealIp>() {
        Some(RealIp(ip)) if net.contains(ip) => next.run(req).await,
        Some(RealIp(ip)) => (
            StatusCode::FORBIDDEN,
            format!("access for IP forbidden: {ip}"),
        )
            .into_response(),
        None => (
            StatusCode::FORBIDDEN,
            "access for IP forbidden: missing X-Real-IP".to_string(),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn state(trusted_subnet: &str) -> Arc<AppState> {
        Arc::new(AppState {
            store: Arc::new(MemoryStore::new()),
            sign_key: String::new(),
            private_key: None,
            trusted_subnet: trusted_subnet.to_string(),
            cancel: CancellationToken::new(),
        })
    }

    fn test_router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                check_trusted_subnet,
            ))
            .layer(axum::middleware::from_fn(extract_real_ip))
            .with_state(state)
    }

    #[tokio::test]
    async fn empty_subnet_allows_everything() {
        let app = test_router(state(""));
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/ping")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ip_outside_subnet_is_forbidden() {
        let app = test_router(state("10.0.0.0/24"));
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/ping")
                    .header("X-Real-IP", "192.168.1.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn ip_inside_subnet_is_allowed() {
        let app = test_router(state("10.0.0.0/24"));
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/ping")
                    .header("X-Real-IP", "10.0.0.5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn forwarded_for_is_used_when_real_ip_is_absent() {
        let app = test_router(state("10.0.0.0/24"));
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/ping")
                    .header("X-Forwarded-For", "10.0.0.7, 203.0.113.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_both_headers_is_forbidden() {
        let app = test_router(state("10.0.0.0/24"));
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/ping")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
