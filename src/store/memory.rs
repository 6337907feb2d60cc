use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::metric::{Kind, Metric};

use super::{merge_counter, merge_gauge, run_cancellable, MetricStore, StoreResult};

/// A single `ID -> Metric` mapping guarded by an async readers/writer lock —
/// the simplest of the three backends and the default when neither a file
/// path nor a database DSN is configured.
#[derive(Default)]
pub struct MemoryStore {
    metrics: RwLock<HashMap<String, Metric>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn update_counter(&self, id: &str, delta: i64, cancel: CancellationToken) -> StoreResult<()> {
        run_cancellable(&cancel, async {
            let mut metrics = self.metrics.write().await;
            let merged = merge_counter(metrics.get(id), id, delta)?;
            metrics.insert(id.to_string(), merged);
            Ok(())
        })
        .await
    }

    async fn reset_counter(&self, id: &str, cancel: CancellationToken) -> StoreResult<()> {
        run_cancellable(&cancel, async {
            let mut metrics = self.metrics.write().await;
            match metrics.get(id) {
                Some(m) if m.kind != Kind::Counter => {
                    return Err(StoreError::KindMismatch(id.to_string()))
                }
                _ => {}
            }
            metrics.insert(id.to_string(), Metric::counter(id, 0));
            Ok(())
        })
        .await
    }

    async fn update_gauge(&self, id: &str, value: f64, cancel: CancellationToken) -> StoreResult<()> {
        run_cancellable(&cancel, async {
            let mut metrics = self.metrics.write().await;
            let merged = merge_gauge(metrics.get(id), id, value)?;
            metrics.insert(id.to_string(), merged);
            Ok(())
        })
        .await
    }

    async fn get_metric(&self, id: &str, kind: Kind, cancel: CancellationToken) -> StoreResult<Metric> {
        run_cancellable(&cancel, async {
            let metrics = self.metrics.read().await;
            metrics
                .get(id)
                .filter(|m| m.kind == kind)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        })
        .await
    }

    async fn get_all(&self, cancel: CancellationToken) -> StoreResult<HashMap<String, Metric>> {
        // A shallow copy, so callers can never observe mutation of our
        // internal map through the returned snapshot.
        run_cancellable(&cancel, async { Ok(self.metrics.read().await.clone()) }).await
    }

    async fn ping(&self, cancel: CancellationToken) -> StoreResult<()> {
        run_cancellable(&cancel, async { Ok(()) }).await
    }
}
