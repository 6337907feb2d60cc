use std::str::FromStr;
use std::sync::Arc;

use askama::Template;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;

use crate::error::ApiError;
use crate::metric::{Kind, Metric, MetricWire};
use crate::store::request_scope;

use super::routes::AppState;
use super::templates::IndexTemplate;

/// `GET /ping` — liveness probe that actually exercises the backend, so a
/// dead store surfaces here instead of only on the first domain route a
/// client happens to hit.
pub async fn ping(State(state): State<Arc<AppState>>) -> Result<&'static str, ApiError> {
    state.store.ping(request_scope(&state.cancel)).await?;
    Ok("pong")
}

/// `POST /update/{kind}/{id}/{value}` — plain-text path-parameter update,
/// unsigned (the original never checks a hash on this route either; it has
/// no field to carry one).
pub async fn update_path(
    State(state): State<Arc<AppState>>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let kind: Kind = kind
        .parse()
        .map_err(|crate::metric::UnknownKind(k)| ApiError::Unimplemented(k))?;

    match kind {
        Kind::Gauge => {
            let value: f64 = value
                .parse()
                .map_err(|_| ApiError::BadInput(format!("cannot save provided data: {value}")))?;
            state
                .store
                .update_gauge(&id, value, request_scope(&state.cancel))
                .await?;
        }
        Kind::Counter => {
            let value: i64 = value
                .parse()
                .map_err(|_| ApiError::BadInput(format!("cannot save provided data: {value}")))?;
            state
                .store
                .update_counter(&id, value, request_scope(&state.cancel))
                .await?;
        }
    }

    Ok(StatusCode::OK)
}

/// `POST /update/` — single metric, JSON body, signature required whenever
/// a sign key is configured. Decodes through [`MetricWire`] first so an
/// unrecognized `type` token answers 501 instead of axum's blanket 400
/// `Json` rejection.
pub async fn update_json(
    State(state): State<Arc<AppState>>,
    Json(wire): Json<MetricWire>,
) -> Result<Json<Metric>, ApiError> {
    let metric = wire
        .into_metric()
        .map_err(|crate::metric::UnknownKind(k)| ApiError::Unimplemented(k))?;

    if !metric.is_hash_valid(&state.sign_key) {
        return Err(ApiError::BadSignature);
    }

    match metric.kind {
        Kind::Gauge => {
            let value = metric
                .value
                .ok_or_else(|| ApiError::BadInput("gauge metric is missing its value".into()))?;
            state
                .store
                .update_gauge(&metric.id, value, request_scope(&state.cancel))
                .await?;
        }
        Kind::Counter => {
            let delta = metric
                .delta
                .ok_or_else(|| ApiError::BadInput("counter metric is missing its delta".into()))?;
            state
                .store
                .update_counter(&metric.id, delta, request_scope(&state.cancel))
                .await?;
        }
    }

    let mut stored = state
        .store
        .get_metric(&metric.id, metric.kind, request_scope(&state.cancel))
        .await?;
    stored.sign(&state.sign_key);
    Ok(Json(stored))
}

/// `POST /updates/` — batch of metrics, JSON array body. Every signature
/// is checked before anything is applied, so a single bad hash rejects the
/// whole payload.
pub async fn update_batch(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<Vec<Metric>>,
) -> Result<StatusCode, ApiError> {
    for metric in &batch {
        if !metric.is_hash_valid(&state.sign_key) {
            return Err(ApiError::BadSignature);
        }
    }

    state
        .store
        .update_batch(&batch, request_scope(&state.cancel))
        .await?;

    Ok(StatusCode::OK)
}

/// `POST /value/` — single metric lookup, JSON body carrying `id`/`type`.
/// Same [`MetricWire`] detour as `update_json`, for the same reason.
pub async fn value_json(
    State(state): State<Arc<AppState>>,
    Json(wire): Json<MetricWire>,
) -> Result<Json<Metric>, ApiError> {
    let query = wire
        .into_metric()
        .map_err(|crate::metric::UnknownKind(k)| ApiError::Unimplemented(k))?;
    let mut metric = state
        .store
        .get_metric(&query.id, query.kind, request_scope(&state.cancel))
        .await?;
    metric.sign(&state.sign_key);
    Ok(Json(metric))
}

/// `GET /value/{kind}/{id}` — plain-text lookup.
pub async fn value_path(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<String, ApiError> {
    let kind = Kind::from_str(&kind).map_err(|crate::metric::UnknownKind(k)| ApiError::Unimplemented(k))?;
    let metric = state
        .store
        .get_metric(&id, kind, request_scope(&state.cancel))
        .await?;
    Ok(metric.to_string())
}

/// `GET /` — HTML index of every stored metric.
pub async fn index(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let metrics: Vec<Metric> = state
        .store
        .get_all(request_scope(&state.cancel))
        .await?
        .into_values()
        .collect();
    let template = IndexTemplate::from_metrics(metrics);
    let body = template
        .render()
        .map_err(|err| ApiError::BadInput(format!("template render failed: {err}")))?;
    Ok(Html(body).into_response())
}
