use std::sync::OnceLock;
use std::time::Duration;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the process-wide Prometheus recorder on first call and returns
/// a handle that can render the current snapshot as text; later calls
/// return the same handle rather than trying to install a second global
/// recorder. This covers the pipeline's own health (request latency, store
/// errors), distinct from the domain gauges/counters the service collects
/// on behalf of agents.
pub fn install_recorder() -> PrometheusHandle {
    RECORDER
        .get_or_init(|| {
            const LATENCY_BUCKETS: &[f64] = &[
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ];

            PrometheusBuilder::new()
                .set_buckets_for_metric(
                    Matcher::Full("http_request_duration_seconds".to_string()),
                    LATENCY_BUCKETS,
                )
                .unwrap()
                .install_recorder()
                .unwrap()
        })
        .clone()
}

/// Records one request's outcome against the matched route template (not
/// the raw path, which would blow up cardinality with path parameters).
pub fn record_request(route: &str, status: u16, duration: Duration) {
    let route = route.to_string();
    metrics::increment_counter!("http_requests_total", "route" => route.clone(), "status" => status.to_string());
    metrics::histogram!("http_request_duration_seconds", duration.as_secs_f64(), "route" => route);
}

pub fn record_store_error(backend: &'static str) {
    metrics::increment_counter!("store_errors_total", "backend" => backend);
}
