use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::routes::AppState;

/// Decrypts the request body in place when the server holds a private key.
/// No key configured, or an empty body, passes the request through
/// untouched — mirroring the original's `BodyDecrypt`, which only reaches
/// for RSA when both a key and a body are present.
pub async fn decrypt_body(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(private_key) = state.private_key.as_ref() else {
        return next.run(req).await;
    };

    let (mut parts, body) = req.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Cannot read provided data: {err}"),
            )
                .into_response();
        }
    };

    if bytes.is_empty() {
        let req = Request::from_parts(parts, Body::from(bytes));
        return next.run(req).await;
    }

    let decrypted = match crate::crypto::decrypt(private_key, &bytes) {
        Ok(plaintext) => plaintext,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("Cannot decrypt provided data: {err}"),
            )
                .into_response();
        }
    };

    parts.headers.insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);

    let req = Request::from_parts(parts, Body::from(decrypted));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::routing::post;
    use axum::Router;
    use rand::rngs::OsRng;
    use rsa::RsaPrivateKey;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    async fn echo_body(body: axum::body::Bytes) -> Vec<u8> {
        body.to_vec()
    }

    fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/echo", post(echo_body))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                decrypt_body,
            ))
            .with_state(state)
    }

    #[tokio::test]
    async fn no_key_passes_body_through() {
        let state = Arc::new(AppState {
            store: Arc::new(MemoryStore::new()),
            sign_key: String::new(),
            private_key: None,
            trusted_subnet: String::new(),
            cancel: CancellationToken::new(),
        });

        let resp = router(state)
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::from("plaintext"))
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"plaintext");
    }

    #[tokio::test]
    async fn encrypted_body_is_decrypted_before_reaching_handler() {
        let private = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public = rsa::RsaPublicKey::from(&private);

        let state = Arc::new(AppState {
            store: Arc::new(MemoryStore::new()),
            sign_key: String::new(),
            private_key: Some(Arc::new(private)),
            trusted_subnet: String::new(),
            cancel: CancellationToken::new(),
        });

        let ciphertext = crate::crypto::encrypt(&public, b"secret payload").unwrap();

        let resp = router(state)
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::from(ciphertext))
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"secret payload");
    }
}
