use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobqueue_domain::{
    entities::{ClaimOrdering, ClaimRequest, Job, QueueDepth, ReapedJob, StatusReport},
    repositories::JobRepository,
    services::{ReapDecision, StuckJob},
};
use jobqueue_errors::{QueueError, QueueResult};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{from_millis, opt_from_millis, to_millis};

const JOB_COLUMNS: &str = "id, job_type, payload, status, priority, attempts, max_attempts, \
     created_at, next_run_at, started_at, locked_at, worker_id, last_error, reap_count";

/// SQLite任务存储
///
/// SQLite没有行级锁，认领用单条 `UPDATE ... WHERE id = (SELECT ...) RETURNING`
/// 在写锁内完成选择与加锁；回收按行做比较并交换，行已被并发修改时跳过。
pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> QueueResult<Job> {
        let id: String = row.try_get("id")?;
        let payload: String = row.try_get("payload")?;

        Ok(Job {
            id: Uuid::parse_str(&id)
                .map_err(|e| QueueError::database_error(format!("无效的任务ID {id}: {e}")))?,
            job_type: row.try_get("job_type")?,
            payload: serde_json::from_str(&payload)?,
            status: row.try_get("status")?,
            priority: row.try_get("priority")?,
            attempts: row.try_get("attempts")?,
            max_attempts: row.try_get("max_attempts")?,
            created_at: from_millis(row.try_get("created_at")?)?,
            next_run_at: opt_from_millis(row.try_get("next_run_at")?)?,
            started_at: opt_from_millis(row.try_get("started_at")?)?,
            locked_at: opt_from_millis(row.try_get("locked_at")?)?,
            worker_id: row.try_get("worker_id")?,
            last_error: row.try_get("last_error")?,
            reap_count: row.try_get("reap_count")?,
        })
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    #[instrument(skip(self, job), fields(job_id = %job.id, job_type = %job.job_type))]
    async fn insert(&self, job: &Job) -> QueueResult<Job> {
        let sql = format!(
            r#"
            INSERT INTO jobs (id, job_type, payload, status, priority, attempts, max_attempts,
                              created_at, next_run_at, started_at, locked_at, worker_id,
                              last_error, reap_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {JOB_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(job.id.to_string())
            .bind(job.job_type)
            .bind(job.payload.to_string())
            .bind(job.status)
            .bind(job.priority)
            .bind(job.attempts)
            .bind(job.max_attempts)
            .bind(to_millis(job.created_at))
            .bind(job.next_run_at.map(to_millis))
            .bind(job.started_at.map(to_millis))
            .bind(job.locked_at.map(to_millis))
            .bind(&job.worker_id)
            .bind(&job.last_error)
            .bind(job.reap_count)
            .fetch_one(&self.pool)
            .await
            .map_err(QueueError::Database)?;

        let created = Self::row_to_job(&row)?;
        debug!("插入任务成功: {}", created.entity_description());
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: Uuid) -> QueueResult<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(QueueError::Database)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_job(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, request), fields(worker_id = %request.worker_id))]
    async fn claim_next(
        &self,
        request: &ClaimRequest,
        now: DateTime<Utc>,
    ) -> QueueResult<Option<Job>> {
        let now_ms = to_millis(now);
        let lease_cutoff_ms = to_millis(now - request.lease_timeout);

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE jobs SET status = 'processing', locked_at = ");
        query
            .push_bind(now_ms)
            .push(", started_at = ")
            .push_bind(now_ms)
            .push(", worker_id = ")
            .push_bind(request.worker_id.clone())
            .push(", attempts = attempts + 1 WHERE id = (SELECT id FROM jobs WHERE status = 'pending' AND job_type IN (");

        let mut job_types = query.separated(", ");
        for job_type in &request.job_types {
            job_types.push_bind(job_type.as_str());
        }
        job_types.push_unseparated(") AND COALESCE(next_run_at, ");

        query
            .push_bind(now_ms)
            .push(") <= ")
            .push_bind(now_ms)
            .push(" AND (locked_at IS NULL OR locked_at < ")
            .push_bind(lease_cutoff_ms)
            .push(") ORDER BY ");

        if request.ordering == ClaimOrdering::PriorityFirst {
            query.push("priority DESC, ");
        }
        query
            .push("COALESCE(next_run_at, ")
            .push_bind(now_ms)
            .push(") ASC, created_at ASC, rowid ASC LIMIT 1) AND status = 'pending' RETURNING ")
            .push(JOB_COLUMNS);

        let row = query
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(QueueError::Database)?;

        match row {
            Some(row) => {
                let job = Self::row_to_job(&row)?;
                debug!("认领任务成功: {}", job.entity_description());
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, report), fields(job_id = %report.job_id, status = %report.status.as_job_status()))]
    async fn report_status(&self, report: &StatusReport, _now: DateTime<Utc>) -> QueueResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?2,
                last_error = COALESCE(?3, last_error),
                next_run_at = COALESCE(?4, next_run_at),
                locked_at = CASE WHEN ?5 THEN NULL ELSE locked_at END,
                started_at = CASE WHEN ?5 THEN NULL ELSE started_at END,
                worker_id = CASE WHEN ?5 THEN NULL ELSE worker_id END
            WHERE id = ?1 AND status = 'processing'
            "#,
        )
        .bind(report.job_id.to_string())
        .bind(report.status.as_job_status())
        .bind(&report.error_message)
        .bind(report.next_run_at.map(to_millis))
        .bind(report.status.is_terminal())
        .execute(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        let found = result.rows_affected() > 0;
        debug!("更新任务状态: {} -> {} (found={})", report.job_id, report.status.as_job_status(), found);
        Ok(found)
    }

    #[instrument(skip(self))]
    async fn reap_expired(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        limit: i64,
        max_error_length: usize,
    ) -> QueueResult<Vec<ReapedJob>> {
        let rows = sqlx::query(
            r#"
            SELECT id, attempts, max_attempts, worker_id, started_at
            FROM jobs
            WHERE status = 'processing' AND started_at < ?
            ORDER BY started_at ASC
            LIMIT ?
            "#,
        )
        .bind(to_millis(cutoff))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        let mut reaped = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let started_at_ms: Option<i64> = row.try_get("started_at")?;
            let stuck = StuckJob {
                job_id: Uuid::parse_str(&id)
                    .map_err(|e| QueueError::database_error(format!("无效的任务ID {id}: {e}")))?,
                attempts: row.try_get("attempts")?,
                max_attempts: row.try_get("max_attempts")?,
                worker_id: row.try_get("worker_id")?,
                started_at: opt_from_millis(started_at_ms)?,
            };
            let decision = ReapDecision::decide(&stuck, now, max_error_length);

            // 仅当行仍处于扫描时看到的那次租约时才改写
            let result = sqlx::query(
                r#"
                UPDATE jobs
                SET status = ?2,
                    next_run_at = COALESCE(?3, next_run_at),
                    last_error = ?4,
                    reap_count = reap_count + 1,
                    locked_at = NULL,
                    started_at = NULL,
                    worker_id = NULL
                WHERE id = ?1 AND status = 'processing' AND started_at = ?5
                "#,
            )
            .bind(&id)
            .bind(decision.status)
            .bind(decision.next_run_at.map(to_millis))
            .bind(&decision.last_error)
            .bind(started_at_ms)
            .execute(&self.pool)
            .await
            .map_err(QueueError::Database)?;

            if result.rows_affected() == 0 {
                debug!(job_id = %stuck.job_id, "任务已被并发修改，跳过回收");
                continue;
            }

            if decision.status.is_terminal() {
                warn!(
                    job_id = %stuck.job_id,
                    attempts = stuck.attempts,
                    max_attempts = stuck.max_attempts,
                    "任务租约超时且重试次数耗尽，已移入死信"
                );
            } else {
                debug!(job_id = %stuck.job_id, attempts = stuck.attempts, "任务租约超时，已退避重置");
            }
            reaped.push(decision.to_reaped(&stuck));
        }

        Ok(reaped)
    }

    async fn count_by_status(&self) -> QueueResult<Vec<QueueDepth>> {
        let rows = sqlx::query(
            r#"
            SELECT job_type, status, COUNT(*) AS count
            FROM jobs
            GROUP BY job_type, status
            ORDER BY job_type, status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        rows.iter()
            .map(|row| {
                Ok(QueueDepth {
                    job_type: row.try_get("job_type")?,
                    status: row.try_get("status")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    async fn list_dead_letters(&self, limit: i64) -> QueueResult<Vec<Job>> {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE status = 'failed' AND reap_count > 0 AND attempts >= max_attempts
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(QueueError::Database)?;

        rows.iter().map(Self::row_to_job).collect()
    }
}
