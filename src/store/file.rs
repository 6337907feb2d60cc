use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::metric::{Kind, Metric};

use super::{MemoryStore, MetricStore, StoreResult};

/// A [`MemoryStore`] fronting a JSON snapshot file. Reads and writes never
/// touch disk directly; every mutation instead marks the store dirty by
/// sending on `dirty`, and a [`super::Preserver`] owns the actual flush
/// cadence. This mirrors the original's separation between the repository
/// (in-memory, synchronous) and its preserver (async, periodic).
pub struct FileStore {
    inner: MemoryStore,
    path: PathBuf,
    dirty: watch::Sender<()>,
}

impl FileStore {
    /// Builds an empty store over `path`, or loads an existing snapshot if
    /// `restore` is true and the file exists.
    pub async fn new(path: PathBuf, restore: bool) -> StoreResult<Self> {
        let inner = MemoryStore::new();
        let (dirty, _rx) = watch::channel(());

        let store = Self { inner, path, dirty };

        if restore {
            store.load().await?;
        }

        Ok(store)
    }

    /// Subscribes to dirty notifications; used by the [`super::Preserver`]
    /// to wake on every mutation when running in immediate-flush mode.
    pub fn subscribe(&self) -> watch::Receiver<()> {
        self.dirty.subscribe()
    }

    fn mark_dirty(&self) {
        // No receivers is not an error: the preserver may not have started
        // yet, or flushing may be disabled entirely.
        let _ = self.dirty.send(());
    }

    /// Reads the snapshot file into memory, replacing whatever is currently
    /// held. A missing file is treated as an empty store, not an error. Load
    /// is a boot-time operation with no surrounding request scope, so it
    /// runs under its own non-cancellable token.
    pub async fn load(&self) -> StoreResult<()> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(StoreError::Io(err)),
        };

        if contents.is_empty() {
            return Ok(());
        }

        let snapshot: HashMap<String, Metric> = serde_json::from_slice(&contents)?;
        let batch: Vec<Metric> = snapshot.into_values().collect();
        self.inner.update_batch(&batch, CancellationToken::new()).await?;
        Ok(())
    }

    /// Serializes the current snapshot to `path` as a JSON object keyed by
    /// metric ID, via a temp file + rename so a crash mid-write never
    /// truncates the previous good snapshot. Driven by the [`super::Preserver`]
    /// on its own cadence, so this too runs under a fresh non-cancellable
    /// token rather than a request-derived one.
    pub async fn flush(&self) -> StoreResult<()> {
        let snapshot: HashMap<String, Metric> = self.inner.get_all(CancellationToken::new()).await?;
        let body = serde_json::to_vec(&snapshot)?;

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &body).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl MetricStore for FileStore {
    async fn update_counter(&self, id: &str, delta: i64, cancel: CancellationToken) -> StoreResult<()> {
        self.inner.update_counter(id, delta, cancel).await?;
        self.mark_dirty();
        Ok(())
    }

    async fn reset_counter(&self, id: &str, cancel: CancellationToken) -> StoreResult<()> {
        self.inner.reset_counter(id, cancel).await?;
        self.mark_dirty();
        Ok(())
    }

    async fn update_gauge(&self, id: &str, value: f64, cancel: CancellationToken) -> StoreResult<()> {
        self.inner.update_gauge(id, value, cancel).await?;
        self.mark_dirty();
        Ok(())
    }

    async fn update_batch(&self, batch: &[Metric], cancel: CancellationToken) -> StoreResult<()> {
        self.inner.update_batch(batch, cancel).await?;
        self.mark_dirty();
        Ok(())
    }

    async fn get_metric(&self, id: &str, kind: Kind, cancel: CancellationToken) -> StoreResult<Metric> {
        self.inner.get_metric(id, kind, cancel).await
    }

    async fn get_all(&self, cancel: CancellationToken) -> StoreResult<HashMap<String, Metric>> {
        self.inner.get_all(cancel).await
    }

    async fn ping(&self, cancel: CancellationToken) -> StoreResult<()> {
        self.inner.ping(cancel).await
    }
}
