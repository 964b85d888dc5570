//! 领域仓储抽象
//!
//! 存储后端（PostgreSQL、SQLite、内存）实现这些trait。时间一律由调用方传入。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobqueue_errors::QueueResult;
use uuid::Uuid;

use crate::entities::{ClaimRequest, Job, QueueDepth, ReapedJob, StatusReport};
use crate::worker::{QueueMetrics, WorkerHeartbeat};

/// 任务存储
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: &Job) -> QueueResult<Job>;

    async fn get_by_id(&self, id: Uuid) -> QueueResult<Option<Job>>;

    /// 原子地认领一个符合条件的任务。并发调用方之间至多一个拿到同一行。
    async fn claim_next(
        &self,
        request: &ClaimRequest,
        now: DateTime<Utc>,
    ) -> QueueResult<Option<Job>>;

    /// 只更新仍处于 `processing` 的任务，返回是否更新了
    async fn report_status(&self, report: &StatusReport, now: DateTime<Utc>) -> QueueResult<bool>;

    /// 处理 `started_at < cutoff` 的 `processing` 任务，每次至多 `limit` 行
    async fn reap_expired(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        limit: i64,
        max_error_length: usize,
    ) -> QueueResult<Vec<ReapedJob>>;

    async fn count_by_status(&self) -> QueueResult<Vec<QueueDepth>>;

    /// 被回收器移入死信的任务，按 `created_at` 倒序
    async fn list_dead_letters(&self, limit: i64) -> QueueResult<Vec<Job>>;
}

/// Worker心跳仓储
#[async_trait]
pub trait HeartbeatRepository: Send + Sync {
    async fn upsert(&self, heartbeat: &WorkerHeartbeat) -> QueueResult<()>;
    async fn find_by_id(&self, worker_id: &str) -> QueueResult<Option<WorkerHeartbeat>>;
    async fn find_all(&self) -> QueueResult<Vec<WorkerHeartbeat>>;
    /// `last_seen_at < cutoff`，按 `last_seen_at` 升序
    async fn find_stale(&self, cutoff: DateTime<Utc>) -> QueueResult<Vec<WorkerHeartbeat>>;
}

/// 队列处理指标仓储
#[async_trait]
pub trait QueueMetricsRepository: Send + Sync {
    async fn record_completion(
        &self,
        queue_name: &str,
        latency_ms: f64,
        success: bool,
        now: DateTime<Utc>,
    ) -> QueueResult<QueueMetrics>;

    async fn find_by_queue(&self, queue_name: &str) -> QueueResult<Option<QueueMetrics>>;
}
