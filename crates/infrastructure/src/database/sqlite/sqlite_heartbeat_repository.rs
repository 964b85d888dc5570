use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobqueue_domain::{repositories::HeartbeatRepository, worker::WorkerHeartbeat};
use jobqueue_errors::{QueueError, QueueResult};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use super::{from_millis, to_millis};

pub struct SqliteHeartbeatRepository {
    pool: SqlitePool,
}

impl SqliteHeartbeatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_heartbeat(row: &sqlx::sqlite::SqliteRow) -> QueueResult<WorkerHeartbeat> {
        Ok(WorkerHeartbeat {
            worker_id: row.try_get("worker_id")?,
            queue_name: row.try_get("queue_name")?,
            hostname: row.try_get("hostname")?,
            version: row.try_get("version")?,
            pid: row.try_get("pid")?,
            status: row.try_get("status")?,
            processed_count: row.try_get("processed_count")?,
            failed_count: row.try_get("failed_count")?,
            last_seen_at: from_millis(row.try_get("last_seen_at")?)?,
        })
    }
}

#[async_trait]
impl HeartbeatRepository for SqliteHeartbeatRepository {
    #[instrument(skip(self, heartbeat), fields(worker_id = %heartbeat.worker_id))]
    async fn upsert(&self, heartbeat: &WorkerHeartbeat) -> QueueResult<()> {
        sqlx::query(
            r#"
            INSERT INTO worker_heartbeats (worker_id, queue_name, hostname, version, pid, status,
                                           processed_count, failed_count, last_seen_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (worker_id) DO UPDATE SET
                queue_name = excluded.queue_name,
                hostname = excluded.hostname,
                version = excluded.version,
                pid = excluded.pid,
                status = excluded.status,
                processed_count = excluded.processed_count,
                failed_count = excluded.failed_count,
                last_seen_at = excluded.last_seen_at
            "#,
        )
        .bind(&heartbeat.worker_id)
        .bind(&heartbeat.queue_name)
        .bind(&heartbeat.hostname)
        .bind(&heartbeat.version)
        .bind(heartbeat.pid)
        .bind(heartbeat.status)
        .bind(heartbeat.processed_count)
        .bind(heartbeat.failed_count)
        .bind(to_millis(heartbeat.last_seen_at))
        .execute(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        debug!("更新Worker心跳成功: {}", heartbeat.worker_id);
        Ok(())
    }

    async fn find_by_id(&self, worker_id: &str) -> QueueResult<Option<WorkerHeartbeat>> {
        let row = sqlx::query("SELECT * FROM worker_heartbeats WHERE worker_id = ?")
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueueError::Database)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_heartbeat(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_all(&self) -> QueueResult<Vec<WorkerHeartbeat>> {
        let rows = sqlx::query("SELECT * FROM worker_heartbeats ORDER BY worker_id")
            .fetch_all(&self.pool)
            .await
            .map_err(QueueError::Database)?;

        rows.iter().map(Self::row_to_heartbeat).collect()
    }

    async fn find_stale(&self, cutoff: DateTime<Utc>) -> QueueResult<Vec<WorkerHeartbeat>> {
        let rows = sqlx::query(
            "SELECT * FROM worker_heartbeats WHERE last_seen_at < ? ORDER BY last_seen_at ASC",
        )
        .bind(to_millis(cutoff))
        .fetch_all(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        rows.iter().map(Self::row_to_heartbeat).collect()
    }
}
