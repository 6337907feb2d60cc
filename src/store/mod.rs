mod database;
mod file;
mod memory;
mod preserver;

pub use database::DatabaseStore;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use preserver::Preserver;

use crate::error::StoreError;
use crate::metric::{Kind, Metric};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub type StoreResult<T> = Result<T, StoreError>;

/// The one-second deadline every request (or gRPC stream message) derives
/// its child cancellation scope from (§4.5 "Every request derives a child
/// scope with a one-second deadline for the store operation").
pub const STORE_DEADLINE: Duration = Duration::from_secs(1);

/// Derives a child of `parent` that cancels itself once [`STORE_DEADLINE`]
/// elapses, or as soon as `parent` itself cancels — whichever comes first.
/// Callers pass the result straight into a `MetricStore` method instead of
/// wrapping the call in a bare `tokio::time::timeout`.
pub fn request_scope(parent: &CancellationToken) -> CancellationToken {
    let child = parent.child_token();
    let armed = child.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(STORE_DEADLINE) => armed.cancel(),
            _ = armed.cancelled() => {}
        }
    });
    child
}

/// Races `fut` against `cancel` firing, turning a fired cancellation into a
/// `StoreError::Unavailable` rather than letting the backend call run past
/// its scope's deadline.
pub(crate) async fn run_cancellable<T>(
    cancel: &CancellationToken,
    fut: impl std::future::Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    tokio::select! {
        result = fut => result,
        _ = cancel.cancelled() => Err(StoreError::Unavailable(anyhow::anyhow!("store call cancelled"))),
    }
}

/// The uniform repository contract every backend satisfies (§4.2). Callers
/// hold it as `Arc<dyn MetricStore>` so the HTTP handlers, RPC service,
/// poller and reporter are all backend-agnostic. Every method takes the
/// cancellation scope it runs under instead of re-deriving an ad hoc
/// timeout per call site.
#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn update_counter(&self, id: &str, delta: i64, cancel: CancellationToken) -> StoreResult<()>;

    /// Forces the counter to zero, creating it if absent.
    async fn reset_counter(&self, id: &str, cancel: CancellationToken) -> StoreResult<()>;

    async fn update_gauge(&self, id: &str, value: f64, cancel: CancellationToken) -> StoreResult<()>;

    /// Applies every metric in `batch`, atomic-per-backend where possible.
    /// The default implementation applies metrics one at a time and is
    /// *not* atomic; backends capable of doing better override it.
    async fn update_batch(&self, batch: &[Metric], cancel: CancellationToken) -> StoreResult<()> {
        for metric in batch {
            apply_one(self, metric, cancel.clone()).await?;
        }
        Ok(())
    }

    async fn get_metric(&self, id: &str, kind: Kind, cancel: CancellationToken) -> StoreResult<Metric>;

    async fn get_all(&self, cancel: CancellationToken) -> StoreResult<HashMap<String, Metric>>;

    async fn ping(&self, cancel: CancellationToken) -> StoreResult<()>;
}

async fn apply_one(
    store: &(impl MetricStore + ?Sized),
    metric: &Metric,
    cancel: CancellationToken,
) -> StoreResult<()> {
    match metric.kind {
        Kind::Gauge => {
            store
                .update_gauge(&metric.id, metric.value.unwrap_or_default(), cancel)
                .await
        }
        Kind::Counter => {
            store
                .update_counter(&metric.id, metric.delta.unwrap_or_default(), cancel)
                .await
        }
    }
}

/// Merges `incoming` into `existing` (or creates a fresh record), enforcing
/// the "same id keeps the same kind for its lifetime" invariant (§3).
pub(crate) fn merge_counter(existing: Option<&Metric>, id: &str, delta: i64) -> StoreResult<Metric> {
    match existing {
        Some(m) if m.kind != Kind::Counter => Err(StoreError::KindMismatch(id.to_string())),
        Some(m) => Ok(Metric::counter(id, m.delta.unwrap_or_default() + delta)),
        None => Ok(Metric::counter(id, delta)),
    }
}

pub(crate) fn merge_gauge(existing: Option<&Metric>, id: &str, value: f64) -> StoreResult<Metric> {
    match existing {
        Some(m) if m.kind != Kind::Gauge => Err(StoreError::KindMismatch(id.to_string())),
        _ => Ok(Metric::gauge(id, value)),
    }
}
