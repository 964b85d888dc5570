use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobqueue_domain::{repositories::QueueMetricsRepository, worker::QueueMetrics};
use jobqueue_errors::{QueueError, QueueResult};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use super::{from_millis, opt_from_millis, to_millis};

pub struct SqliteQueueMetricsRepository {
    pool: SqlitePool,
}

impl SqliteQueueMetricsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_metrics(row: &sqlx::sqlite::SqliteRow) -> QueueResult<QueueMetrics> {
        Ok(QueueMetrics {
            queue_name: row.try_get("queue_name")?,
            processed_count: row.try_get("processed_count")?,
            failed_count: row.try_get("failed_count")?,
            avg_latency_ms: row.try_get("avg_latency_ms")?,
            min_latency_ms: row.try_get("min_latency_ms")?,
            max_latency_ms: row.try_get("max_latency_ms")?,
            last_success_at: opt_from_millis(row.try_get("last_success_at")?)?,
            updated_at: from_millis(row.try_get("updated_at")?)?,
        })
    }
}

#[async_trait]
impl QueueMetricsRepository for SqliteQueueMetricsRepository {
    #[instrument(skip(self))]
    async fn record_completion(
        &self,
        queue_name: &str,
        latency_ms: f64,
        success: bool,
        now: DateTime<Utc>,
    ) -> QueueResult<QueueMetrics> {
        let row = sqlx::query(
            r#"
            INSERT INTO queue_metrics (queue_name, processed_count, failed_count, avg_latency_ms,
                                       min_latency_ms, max_latency_ms, last_success_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4, ?4, ?5, ?6)
            ON CONFLICT (queue_name) DO UPDATE SET
                processed_count = queue_metrics.processed_count + excluded.processed_count,
                failed_count = queue_metrics.failed_count + excluded.failed_count,
                avg_latency_ms = (queue_metrics.avg_latency_ms * 9 + excluded.avg_latency_ms) / 10,
                min_latency_ms = MIN(queue_metrics.min_latency_ms, excluded.min_latency_ms),
                max_latency_ms = MAX(queue_metrics.max_latency_ms, excluded.max_latency_ms),
                last_success_at = COALESCE(excluded.last_success_at, queue_metrics.last_success_at),
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(queue_name)
        .bind(i64::from(success))
        .bind(i64::from(!success))
        .bind(latency_ms)
        .bind(success.then(|| to_millis(now)))
        .bind(to_millis(now))
        .fetch_one(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        Self::row_to_metrics(&row)
    }

    async fn find_by_queue(&self, queue_name: &str) -> QueueResult<Option<QueueMetrics>> {
        let row = sqlx::query("SELECT * FROM queue_metrics WHERE queue_name = ?")
            .bind(queue_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueueError::Database)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_metrics(&row)?)),
            None => Ok(None),
        }
    }
}
