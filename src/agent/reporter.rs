use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::metric::{Kind, Metric};
use crate::rpc::convert::to_proto;
use crate::rpc::proto::metrics_client::MetricsClient;
use crate::rpc::proto::MetricRequest;
use crate::store::MetricStore;

use super::transport::Transport;

pub struct ReporterConfig {
    pub http_base_url: String,
    pub grpc_address: String,
    pub report_interval: Duration,
    pub sign_key: String,
}

/// Fans the current snapshot out through four encodings every tick, in the
/// order the original agent sends them, then resets `PollCount` so the next
/// cycle reports a fresh delta.
pub async fn run(
    store: Arc<dyn MetricStore>,
    transport: Arc<Transport>,
    config: ReporterConfig,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.report_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                run_cycle(&store, &transport, &config, &cancel).await;
            }
        }
    }
}

async fn run_cycle(
    store: &Arc<dyn MetricStore>,
    transport: &Arc<Transport>,
    config: &ReporterConfig,
    cancel: &CancellationToken,
) {
    let snapshot = match store.get_all(cancel.clone()).await {
        Ok(map) => {
            let mut metrics: Vec<Metric> = map.into_values().collect();
            metrics.sort_by(|a, b| a.id.cmp(&b.id));
            metrics
        }
        Err(err) => {
            tracing::error!(error = %err, "reporter failed to snapshot store");
            return;
        }
    };

    if snapshot.is_empty() {
        return;
    }

    send_url_path(transport, config, &snapshot).await;
    send_json_single(transport, config, &snapshot).await;
    send_json_batch(transport, config, &snapshot).await;
    send_grpc_stream(config, &snapshot).await;

    if let Err(err) = store.reset_counter("PollCount", cancel.clone()).await {
        tracing::error!(error = %err, "reporter failed to reset PollCount");
    }
}

async fn send_url_path(transport: &Arc<Transport>, config: &ReporterConfig, snapshot: &[Metric]) {
    for metric in snapshot {
        let value = match metric.kind {
            Kind::Gauge => format!("{:.6}", metric.value.unwrap_or_default()),
            Kind::Counter => format!("{}", metric.delta.unwrap_or_default()),
        };
        let url = format!(
            "{}/update/{}/{}/{}",
            config.http_base_url, metric.kind, metric.id, value
        );

        if let Err(err) = transport.post(&url, Vec::new(), "text/plain").await {
            tracing::warn!(error = %err, metric = %metric.id, "url-path report failed");
        }
    }
}

async fn send_json_single(transport: &Arc<Transport>, config: &ReporterConfig, snapshot: &[Metric]) {
    let url = format!("{}/update/", config.http_base_url);
    for metric in snapshot {
        let mut signed = metric.clone();
        signed.sign(&config.sign_key);

        let body = match serde_json::to_vec(&signed) {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(error = %err, metric = %metric.id, "failed to encode metric as json");
                continue;
            }
        };

        if let Err(err) = transport.post(&url, body, "application/json").await {
            tracing::warn!(error = %err, metric = %metric.id, "json report failed");
        }
    }
}

async fn send_json_batch(transport: &Arc<Transport>, config: &ReporterConfig, snapshot: &[Metric]) {
    let url = format!("{}/updates/", config.http_base_url);
    let mut batch = snapshot.to_vec();
    for metric in &mut batch {
        metric.sign(&config.sign_key);
    }

    let body = match serde_json::to_vec(&batch) {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(error = %err, "failed to encode batch as json");
            return;
        }
    };

    if let Err(err) = transport.post(&url, body, "application/json").await {
        tracing::warn!(error = %err, "batch json report failed");
    }
}

async fn send_grpc_stream(config: &ReporterConfig, snapshot: &[Metric]) {
    let endpoint = format!("http://{}", config.grpc_address);
    let mut client = match MetricsClient::connect(endpoint).await {
        Ok(client) => client,
        Err(err) => {
            tracing::warn!(error = %err, "failed to connect to grpc endpoint");
            return;
        }
    };

    let mut signed: Vec<Metric> = snapshot.to_vec();
    for metric in &mut signed {
        metric.sign(&config.sign_key);
    }

    let requests = signed
        .into_iter()
        .map(|m| MetricRequest {
            metric: Some(to_proto(&m)),
        })
        .collect::<Vec<_>>();

    match client
        .update_metrics(tokio_stream::iter(requests))
        .await
    {
        Ok(response) => {
            let ack = response.into_inner();
            if ack.error != "Metrics are updated" {
                tracing::warn!(error = %ack.error, "grpc report rejected");
            }
        }
        Err(status) => {
            tracing::warn!(error = %status, "grpc report failed");
        }
    }
}
