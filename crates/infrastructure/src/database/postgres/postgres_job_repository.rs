use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobqueue_domain::{
    entities::{ClaimOrdering, ClaimRequest, Job, QueueDepth, ReapedJob, StatusReport},
    repositories::JobRepository,
    services::{ReapDecision, StuckJob},
    JobStatus,
};
use jobqueue_errors::{QueueError, QueueResult};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, job_type, payload, status, priority, attempts, max_attempts, \
     created_at, next_run_at, started_at, locked_at, worker_id, last_error, reap_count";

/// PostgreSQL任务存储
///
/// 认领与回收都依赖 `FOR UPDATE SKIP LOCKED`：被其他事务锁住的行直接跳过，
/// 调用方之间从不互相等待。
pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::postgres::PgRow) -> QueueResult<Job> {
        Ok(Job {
            id: row.try_get("id")?,
            job_type: row.try_get("job_type")?,
            payload: row.try_get("payload")?,
            status: row.try_get("status")?,
            priority: row.try_get("priority")?,
            attempts: row.try_get("attempts")?,
            max_attempts: row.try_get("max_attempts")?,
            created_at: row.try_get("created_at")?,
            next_run_at: row.try_get("next_run_at")?,
            started_at: row.try_get("started_at")?,
            locked_at: row.try_get("locked_at")?,
            worker_id: row.try_get("worker_id")?,
            last_error: row.try_get("last_error")?,
            reap_count: row.try_get("reap_count")?,
        })
    }

    fn order_by(ordering: ClaimOrdering) -> &'static str {
        match ordering {
            ClaimOrdering::DueTime => "COALESCE(next_run_at, $3) ASC, created_at ASC",
            ClaimOrdering::PriorityFirst => {
                "priority DESC, COALESCE(next_run_at, $3) ASC, created_at ASC"
            }
        }
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    #[instrument(skip(self, job), fields(job_id = %job.id, job_type = %job.job_type))]
    async fn insert(&self, job: &Job) -> QueueResult<Job> {
        let sql = format!(
            r#"
            INSERT INTO jobs (id, job_type, payload, status, priority, attempts, max_attempts,
                              created_at, next_run_at, started_at, locked_at, worker_id,
                              last_error, reap_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {JOB_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(job.id)
            .bind(job.job_type)
            .bind(&job.payload)
            .bind(job.status)
            .bind(job.priority)
            .bind(job.attempts)
            .bind(job.max_attempts)
            .bind(job.created_at)
            .bind(job.next_run_at)
            .bind(job.started_at)
            .bind(job.locked_at)
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
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
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
        let job_types: Vec<String> = request
            .job_types
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();
        let lease_cutoff = now - request.lease_timeout;

        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'processing',
                locked_at = $3,
                started_at = $3,
                worker_id = $4,
                attempts = attempts + 1
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = 'pending'
                  AND job_type = ANY($1)
                  AND COALESCE(next_run_at, $3) <= $3
                  AND (locked_at IS NULL OR locked_at < $2)
                ORDER BY {}
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            AND status = 'pending'
            RETURNING {JOB_COLUMNS}
            "#,
            Self::order_by(request.ordering)
        );

        let row = sqlx::query(&sql)
            .bind(&job_types)
            .bind(lease_cutoff)
            .bind(now)
            .bind(&request.worker_id)
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
            SET status = $2,
                last_error = COALESCE($3, last_error),
                next_run_at = COALESCE($4, next_run_at),
                locked_at = CASE WHEN $5 THEN NULL ELSE locked_at END,
                started_at = CASE WHEN $5 THEN NULL ELSE started_at END,
                worker_id = CASE WHEN $5 THEN NULL ELSE worker_id END
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(report.job_id)
        .bind(report.status.as_job_status())
        .bind(&report.error_message)
        .bind(report.next_run_at)
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
        let mut tx = self.pool.begin().await.map_err(QueueError::Database)?;

        let rows = sqlx::query(
            r#"
            SELECT id, attempts, max_attempts, worker_id, started_at
            FROM jobs
            WHERE status = 'processing' AND started_at < $1
            ORDER BY started_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await
        .map_err(QueueError::Database)?;

        let mut reaped = Vec::with_capacity(rows.len());
        for row in rows {
            let stuck = StuckJob {
                job_id: row.try_get("id")?,
                attempts: row.try_get("attempts")?,
                max_attempts: row.try_get("max_attempts")?,
                worker_id: row.try_get("worker_id")?,
                started_at: row.try_get("started_at")?,
            };
            let decision = ReapDecision::decide(&stuck, now, max_error_length);

            sqlx::query(
                r#"
                UPDATE jobs
                SET status = $2,
                    next_run_at = COALESCE($3, next_run_at),
                    last_error = $4,
                    reap_count = reap_count + 1,
                    locked_at = NULL,
                    started_at = NULL,
                    worker_id = NULL
                WHERE id = $1
                "#,
            )
            .bind(stuck.job_id)
            .bind(decision.status)
            .bind(decision.next_run_at)
            .bind(&decision.last_error)
            .execute(&mut *tx)
            .await
            .map_err(QueueError::Database)?;

            if decision.status == JobStatus::Failed {
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

        tx.commit().await.map_err(QueueError::Database)?;
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
            ORDER BY created_at DESC
            LIMIT $1
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
