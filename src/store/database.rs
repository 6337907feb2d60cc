use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::metric::{Kind, Metric};

use super::{run_cancellable, MetricStore, StoreResult};

/// Postgres-backed store with two tables, `gauge` and `counter`, keyed on
/// `metric_id`. Counter updates upsert atomically via `ON CONFLICT DO
/// UPDATE` so the delta is accumulated server-side in a single statement —
/// the original's repository read the current value, added the delta in
/// Rust, then wrote it back, which races under concurrent updates to the
/// same id.
pub struct DatabaseStore {
    pool: PgPool,
}

impl DatabaseStore {
    pub async fn connect(dsn: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gauge (
                metric_id    TEXT PRIMARY KEY,
                metric_value DOUBLE PRECISION NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS counter (
                metric_id    TEXT PRIMARY KEY,
                metric_delta BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Truncates both domain tables. Used only by the `--reset` CLI flag,
    /// never invoked automatically.
    pub async fn reset(&self) -> StoreResult<()> {
        sqlx::query("TRUNCATE TABLE gauge, counter")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MetricStore for DatabaseStore {
    async fn update_counter(&self, id: &str, delta: i64, cancel: CancellationToken) -> StoreResult<()> {
        run_cancellable(&cancel, async {
            if gauge_exists(&self.pool, id).await? {
                return Err(StoreError::KindMismatch(id.to_string()));
            }

            sqlx::query(
                r#"
                INSERT INTO counter (metric_id, metric_delta) VALUES ($1, $2)
                ON CONFLICT (metric_id) DO UPDATE SET metric_delta = counter.metric_delta + EXCLUDED.metric_delta
                "#,
            )
            .bind(id)
            .bind(delta)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await
    }

    async fn reset_counter(&self, id: &str, cancel: CancellationToken) -> StoreResult<()> {
        run_cancellable(&cancel, async {
            if gauge_exists(&self.pool, id).await? {
                return Err(StoreError::KindMismatch(id.to_string()));
            }

            sqlx::query(
                r#"
                INSERT INTO counter (metric_id, metric_delta) VALUES ($1, 0)
                ON CONFLICT (metric_id) DO UPDATE SET metric_delta = 0
                "#,
            )
            .bind(id)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await
    }

    async fn update_gauge(&self, id: &str, value: f64, cancel: CancellationToken) -> StoreResult<()> {
        run_cancellable(&cancel, async {
            if counter_exists(&self.pool, id).await? {
                return Err(StoreError::KindMismatch(id.to_string()));
            }

            sqlx::query(
                r#"
                INSERT INTO gauge (metric_id, metric_value) VALUES ($1, $2)
                ON CONFLICT (metric_id) DO UPDATE SET metric_value = EXCLUDED.metric_value
                "#,
            )
            .bind(id)
            .bind(value)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await
    }

    async fn update_batch(&self, batch: &[Metric], cancel: CancellationToken) -> StoreResult<()> {
        run_cancellable(&cancel, async {
            let mut tx = self.pool.begin().await?;

            for metric in batch {
                match metric.kind {
                    Kind::Gauge => {
                        let value = metric.value.unwrap_or_default();
                        sqlx::query(
                            r#"
                            INSERT INTO gauge (metric_id, metric_value) VALUES ($1, $2)
                            ON CONFLICT (metric_id) DO UPDATE SET metric_value = EXCLUDED.metric_value
                            "#,
                        )
                        .bind(&metric.id)
                        .bind(value)
                        .execute(&mut *tx)
                        .await?;
                    }
                    Kind::Counter => {
                        let delta = metric.delta.unwrap_or_default();
                        sqlx::query(
                            r#"
                            INSERT INTO counter (metric_id, metric_delta) VALUES ($1, $2)
                            ON CONFLICT (metric_id) DO UPDATE SET metric_delta = counter.metric_delta + EXCLUDED.metric_delta
                            "#,
                        )
                        .bind(&metric.id)
                        .bind(delta)
                        .execute(&mut *tx)
                        .await?;
                    }
                }
            }

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn get_metric(&self, id: &str, kind: Kind, cancel: CancellationToken) -> StoreResult<Metric> {
        run_cancellable(&cancel, async {
            match kind {
                Kind::Gauge => {
                    let row: Option<(f64,)> =
                        sqlx::query_as("SELECT metric_value FROM gauge WHERE metric_id = $1")
                            .bind(id)
                            .fetch_optional(&self.pool)
                            .await?;
                    row.map(|(value,)| Metric::gauge(id, value))
                        .ok_or_else(|| StoreError::NotFound(id.to_string()))
                }
                Kind::Counter => {
                    let row: Option<(i64,)> =
                        sqlx::query_as("SELECT metric_delta FROM counter WHERE metric_id = $1")
                            .bind(id)
                            .fetch_optional(&self.pool)
                            .await?;
                    row.map(|(delta,)| Metric::counter(id, delta))
                        .ok_or_else(|| StoreError::NotFound(id.to_string()))
                }
            }
        })
        .await
    }

    async fn get_all(&self, cancel: CancellationToken) -> StoreResult<HashMap<String, Metric>> {
        run_cancellable(&cancel, async {
            let mut out = HashMap::new();

            let gauges: Vec<(String, f64)> =
                sqlx::query_as("SELECT metric_id, metric_value FROM gauge")
                    .fetch_all(&self.pool)
                    .await?;
            for (id, value) in gauges {
                out.insert(id.clone(), Metric::gauge(id, value));
            }

            let counters: Vec<(String, i64)> =
                sqlx::query_as("SELECT metric_id, metric_delta FROM counter")
                    .fetch_all(&self.pool)
                    .await?;
            for (id, delta) in counters {
                out.insert(id.clone(), Metric::counter(id, delta));
            }

            Ok(out)
        })
        .await
    }

    async fn ping(&self, cancel: CancellationToken) -> StoreResult<()> {
        run_cancellable(&cancel, async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }
}

async fn gauge_exists(pool: &PgPool, id: &str) -> StoreResult<bool> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM gauge WHERE metric_id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

async fn counter_exists(pool: &PgPool, id: &str) -> StoreResult<bool> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM counter WHERE metric_id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

// Exercising this backend requires a live Postgres instance, provided in CI
// via TEST_DATABASE_URL; these tests are skipped when it is unset.
#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> Option<DatabaseStore> {
        let dsn = std::env::var("TEST_DATABASE_URL").ok()?;
        Some(DatabaseStore::connect(&dsn).await.unwrap())
    }

    #[tokio::test]
    async fn counter_upsert_is_atomic_under_concurrency() {
        let Some(store) = test_store().await else {
            return;
        };
        let store = std::sync::Arc::new(store);
        let id = format!("concurrent-{}", uuid::Uuid::new_v4());

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_counter(&id, 1, CancellationToken::new())
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let metric = store
            .get_metric(&id, Kind::Counter, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(metric.delta, Some(20));
    }

    #[tokio::test]
    async fn gauge_overwrites_not_accumulates() {
        let Some(store) = test_store().await else {
            return;
        };
        let id = format!("gauge-{}", uuid::Uuid::new_v4());

        store
            .update_gauge(&id, 1.0, CancellationToken::new())
            .await
            .unwrap();
        store
            .update_gauge(&id, 2.0, CancellationToken::new())
            .await
            .unwrap();

        let metric = store
            .get_metric(&id, Kind::Gauge, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(metric.value, Some(2.0));
    }
}
