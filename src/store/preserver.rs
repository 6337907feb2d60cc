use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::FileStore;

/// Background task that flushes a [`FileStore`] to disk, either on a fixed
/// tick or immediately on every mutation.
///
/// A zero interval means "flush synchronously on every change" — the
/// original's `storeInterval == 0` special case — by waiting on the store's
/// dirty channel instead of a ticker. Any positive interval instead polls
/// on that cadence, batching however many mutations land in between. Either
/// way, a final flush runs once the cancellation token fires so in-flight
/// data is never lost on shutdown.
pub struct Preserver {
    store: Arc<FileStore>,
    interval: Duration,
}

impl Preserver {
    pub fn new(store: Arc<FileStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let result = if self.interval.is_zero() {
            self.run_synchronous(&cancel).await
        } else {
            self.run_ticked(&cancel).await
        };

        if let Err(err) = result {
            tracing::error!(error = %err, "preserver loop exited with error");
        }

        if let Err(err) = self.store.flush().await {
            tracing::error!(error = %err, "final preserver flush failed");
        } else {
            tracing::info!("final preserver flush complete");
        }
    }

    async fn run_synchronous(&self, cancel: &CancellationToken) -> Result<(), crate::error::StoreError> {
        let mut dirty = self.store.subscribe();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                changed = dirty.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    self.store.flush().await?;
                }
            }
        }
    }

    async fn run_ticked(&self, cancel: &CancellationToken) -> Result<(), crate::error::StoreError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    self.store.flush().await?;
                }
            }
        }
    }
}
