use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use jobqueue_domain::{
    minutes_before, seconds_after, stale_cutoff, truncate_error, ClaimRequest, Clock, Job,
    JobType, NewJob, QueueDepth, QueueError, QueueMetrics, QueueResult, ReapedJob, ReportStatus,
    StaleWorker, StatusReport, SystemClock, WorkerHeartbeat, WorkerStatus, WorkerView,
};
use jobqueue_infrastructure::{MetricsCollector, Repositories};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::settings::QueueSettings;

/// Worker上报的心跳内容，`last_seen_at` 由队列按当前时间写入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub worker_id: String,
    pub queue_name: String,
    pub hostname: String,
    pub version: String,
    pub pid: i32,
    pub status: WorkerStatus,
    pub processed_count: i64,
    pub failed_count: i64,
}

/// 任务队列
///
/// 所有状态都在存储中，本结构不缓存任务。多个进程可以各自持有一个
/// `JobQueue` 指向同一个存储。
pub struct JobQueue {
    repositories: Repositories,
    clock: Arc<dyn Clock>,
    metrics: MetricsCollector,
    settings: QueueSettings,
}

impl JobQueue {
    pub fn new(repositories: Repositories, clock: Arc<dyn Clock>, settings: QueueSettings) -> Self {
        Self {
            repositories,
            clock,
            metrics: MetricsCollector::new(),
            settings,
        }
    }

    pub fn with_system_clock(repositories: Repositories, settings: QueueSettings) -> Self {
        Self::new(repositories, Arc::new(SystemClock), settings)
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 入队，返回任务ID。新任务处于 `pending`，`attempts=0`。
    pub async fn enqueue(&self, new_job: NewJob) -> QueueResult<Uuid> {
        let max_attempts = new_job
            .max_attempts
            .unwrap_or(self.settings.default_max_attempts);
        if max_attempts < 1 {
            return Err(QueueError::invalid_argument(format!(
                "max_attempts 必须大于0，实际为 {max_attempts}"
            )));
        }

        let now = self.clock.now();
        let mut job = Job::new(new_job.job_type, new_job.payload, now);
        job.priority = new_job.priority;
        job.max_attempts = max_attempts;
        job.next_run_at = Some(new_job.run_at.unwrap_or(now));

        let job = self.repositories.jobs.insert(&job).await?;
        self.metrics.record_enqueued(job.job_type);

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            priority = job.priority,
            "任务已入队"
        );
        Ok(job.id)
    }

    /// 以字符串形式的任务类型入队，类型不在允许列表中时直接拒绝
    pub async fn enqueue_raw(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        priority: i32,
        run_at: Option<DateTime<Utc>>,
    ) -> QueueResult<Uuid> {
        let job_type: JobType = job_type.parse()?;
        let mut new_job = NewJob::new(job_type, payload).with_priority(priority);
        new_job.run_at = run_at;
        self.enqueue(new_job).await
    }

    /// 认领一个到期任务，没有可认领任务时返回 `None`
    pub async fn claim(
        &self,
        job_types: &[JobType],
        lease_timeout_minutes: i64,
        worker_id: &str,
    ) -> QueueResult<Option<Job>> {
        if job_types.is_empty() {
            return Err(QueueError::invalid_argument("job_types 不能为空"));
        }
        if worker_id.trim().is_empty() {
            return Err(QueueError::invalid_argument("worker_id 不能为空"));
        }
        if lease_timeout_minutes <= 0 {
            return Err(QueueError::invalid_argument(format!(
                "lease_timeout_minutes 必须大于0，实际为 {lease_timeout_minutes}"
            )));
        }

        let now = self.clock.now();
        // 存储层会计算 `now - lease_timeout`，这里先确认不会越界
        minutes_before(now, lease_timeout_minutes, "lease_timeout_minutes")?;
        let request = ClaimRequest {
            job_types: job_types.to_vec(),
            lease_timeout: Duration::minutes(lease_timeout_minutes),
            worker_id: worker_id.to_string(),
            ordering: self.settings.claim_ordering,
        };

        let started = Instant::now();
        let claimed = self.repositories.jobs.claim_next(&request, now).await?;
        self.metrics
            .record_claim(claimed.is_some(), started.elapsed().as_secs_f64());

        match &claimed {
            Some(job) => info!(
                job_id = %job.id,
                job_type = %job.job_type,
                worker_id = %worker_id,
                attempts = job.attempts,
                "任务已被认领"
            ),
            None => debug!(worker_id = %worker_id, "没有可认领的任务"),
        }
        Ok(claimed)
    }

    /// 报告任务状态。任务不存在或已不在 `processing` 时返回 `Ok(false)`。
    pub async fn report(
        &self,
        job_id: Uuid,
        status: ReportStatus,
        error_message: Option<&str>,
        backoff_seconds: Option<i64>,
    ) -> QueueResult<bool> {
        let now = self.clock.now();
        let next_run_at = backoff_seconds
            .filter(|seconds| *seconds > 0)
            .map(|seconds| seconds_after(now, seconds, "backoff_seconds"))
            .transpose()?;
        let report = StatusReport {
            job_id,
            status,
            error_message: error_message
                .map(|message| truncate_error(message, self.settings.max_error_length)),
            next_run_at,
        };

        let found = self.repositories.jobs.report_status(&report, now).await?;
        self.metrics.record_report(status.as_job_status(), found);

        if found {
            info!(
                job_id = %job_id,
                status = status.as_job_status().as_str(),
                "任务状态已更新"
            );
        } else {
            warn!(job_id = %job_id, "报告的任务不存在或已不在处理中，忽略");
        }
        Ok(found)
    }

    /// 回收租约超时的任务，单次最多处理 `reap_batch_size` 行
    pub async fn reap(&self, lease_timeout_minutes: i64) -> QueueResult<Vec<ReapedJob>> {
        if lease_timeout_minutes <= 0 {
            return Err(QueueError::invalid_argument(format!(
                "lease_timeout_minutes 必须大于0，实际为 {lease_timeout_minutes}"
            )));
        }

        let now = self.clock.now();
        let cutoff = minutes_before(now, lease_timeout_minutes, "lease_timeout_minutes")?;
        let started = Instant::now();
        let reaped = self
            .repositories
            .jobs
            .reap_expired(
                cutoff,
                now,
                self.settings.reap_batch_size,
                self.settings.max_error_length,
            )
            .await?;

        let actions: Vec<_> = reaped.iter().map(|r| r.action).collect();
        self.metrics
            .record_reap(&actions, started.elapsed().as_secs_f64());

        for job in &reaped {
            warn!(
                job_id = %job.job_id,
                action = job.action.as_str(),
                attempts = job.attempts,
                max_attempts = job.max_attempts,
                "回收租约超时任务"
            );
        }
        Ok(reaped)
    }

    /// 写入心跳，同一Worker后写覆盖先写
    pub async fn heartbeat(&self, request: HeartbeatRequest) -> QueueResult<()> {
        if request.worker_id.trim().is_empty() {
            return Err(QueueError::invalid_argument("worker_id 不能为空"));
        }

        let heartbeat = WorkerHeartbeat {
            worker_id: request.worker_id,
            queue_name: request.queue_name,
            hostname: request.hostname,
            version: request.version,
            pid: request.pid,
            status: request.status,
            processed_count: request.processed_count,
            failed_count: request.failed_count,
            last_seen_at: self.clock.now(),
        };
        self.repositories.heartbeats.upsert(&heartbeat).await?;
        debug!(
            worker_id = %heartbeat.worker_id,
            status = heartbeat.status.as_str(),
            "心跳已记录"
        );
        Ok(())
    }

    /// 超过 `threshold_minutes` 未上报心跳的Worker
    pub async fn find_stale_workers(&self, threshold_minutes: i64) -> QueueResult<Vec<StaleWorker>> {
        if threshold_minutes < 0 {
            return Err(QueueError::invalid_argument(format!(
                "threshold_minutes 不能为负数，实际为 {threshold_minutes}"
            )));
        }

        let now = self.clock.now();
        let stale = self
            .repositories
            .heartbeats
            .find_stale(stale_cutoff(now, threshold_minutes)?)
            .await?;
        Ok(stale
            .into_iter()
            .map(|heartbeat| StaleWorker::from_heartbeat(heartbeat, now))
            .collect())
    }

    /// 每完成一个任务调用一次，维护按队列聚合的指标
    pub async fn record_completion(
        &self,
        queue_name: &str,
        latency_ms: f64,
        success: bool,
    ) -> QueueResult<QueueMetrics> {
        if queue_name.trim().is_empty() {
            return Err(QueueError::invalid_argument("queue_name 不能为空"));
        }
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return Err(QueueError::invalid_argument(format!(
                "latency_ms 必须是非负数，实际为 {latency_ms}"
            )));
        }

        self.repositories
            .queue_metrics
            .record_completion(queue_name, latency_ms, success, self.clock.now())
            .await
    }

    pub async fn get_job(&self, job_id: Uuid) -> QueueResult<Option<Job>> {
        self.repositories.jobs.get_by_id(job_id).await
    }

    /// 按任务类型与状态统计，同时刷新队列深度指标
    pub async fn queue_depth(&self) -> QueueResult<Vec<QueueDepth>> {
        let depths = self.repositories.jobs.count_by_status().await?;
        self.metrics.update_queue_depth(&depths);
        Ok(depths)
    }

    pub async fn list_dead_letters(&self, limit: i64) -> QueueResult<Vec<Job>> {
        if limit <= 0 {
            return Err(QueueError::invalid_argument(format!(
                "limit 必须大于0，实际为 {limit}"
            )));
        }
        self.repositories.jobs.list_dead_letters(limit).await
    }

    /// 所有Worker及其按最近心跳推导出的健康状态
    pub async fn list_workers(&self) -> QueueResult<Vec<WorkerView>> {
        let now = self.clock.now();
        let heartbeats = self.repositories.heartbeats.find_all().await?;
        Ok(heartbeats
            .into_iter()
            .map(|heartbeat| WorkerView {
                health: heartbeat.health(now),
                heartbeat,
            })
            .collect())
    }

    pub async fn get_queue_metrics(&self, queue_name: &str) -> QueueResult<Option<QueueMetrics>> {
        self.repositories.queue_metrics.find_by_queue(queue_name).await
    }
}
