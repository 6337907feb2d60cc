use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Errors surfaced by a [`crate::store::MetricStore`] implementation.
///
/// `KindMismatch` and `Unavailable` are the two variants the store contract
/// promises to surface as typed errors (§4.2); everything else collapses
/// into `Internal`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("metric {0} already exists with a different kind")]
    KindMismatch(String),

    #[error("metric not found: {0}")]
    NotFound(String),

    #[error("store backend unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The HTTP-facing error type. One place owns the kind→status mapping from
/// §7's taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("bad signature")]
    BadSignature,

    #[error("metric type not implemented: {0}")]
    Unimplemented(String),

    #[error("metric not found: {0}")]
    NotFound(String),

    #[error("unauthorised: {0}")]
    Unauthorised(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The backend-error label recorded against the `store_errors_total`
/// telemetry counter. `KindMismatch`/`NotFound` are ordinary client-driven
/// outcomes, not backend failures, so callers only reach for this on the
/// remaining variants.
pub fn store_error_label(err: &StoreError) -> &'static str {
    match err {
        StoreError::KindMismatch(_) => "kind_mismatch",
        StoreError::NotFound(_) => "not_found",
        StoreError::Unavailable(_) => "unavailable",
        StoreError::Database(_) => "database",
        StoreError::Io(_) => "io",
        StoreError::Serialization(_) => "serialization",
    }
}

impl From<StoreError> for (StatusCode, String) {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::KindMismatch(id) => (
                StatusCode::BAD_REQUEST,
                format!("metric {id} already exists with a different kind"),
            ),
            StoreError::NotFound(id) => (StatusCode::NOT_FOUND, format!("Metric not found: {id}")),
            other => {
                crate::telemetry::record_store_error(store_error_label(&other));
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::BadSignature => (
                StatusCode::BAD_REQUEST,
                "wrong hash provided for metric".to_string(),
            ),
            ApiError::Unimplemented(kind) => (
                StatusCode::NOT_IMPLEMENTED,
                format!("metric type not implemented: {kind}"),
            ),
            ApiError::NotFound(id) => (StatusCode::NOT_FOUND, format!("Metric not found: {id}")),
            ApiError::Unauthorised(addr) => (
                StatusCode::FORBIDDEN,
                format!("access for IP forbidden: {addr}"),
            ),
            ApiError::Store(err) => err.into(),
        };

        if status == StatusCode::NOT_FOUND {
            // Fetch endpoints return a small text body, per §7.
            (status, format!("{message}\n")).into_response()
        } else {
            (status, axum::Json(json!({ "error": message }))).into_response()
        }
    }
}
