//! Test data builders for creating test entities

use chrono::{DateTime, Utc};
use jobqueue_domain::{
    entities::{Job, JobStatus, JobType},
    worker::{WorkerHeartbeat, WorkerStatus},
};
use uuid::Uuid;

/// Builder for creating test Job entities
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            job: Job::new(JobType::Enrich, serde_json::json!({}), Utc::now()),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.job.id = id;
        self
    }

    pub fn with_job_type(mut self, job_type: JobType) -> Self {
        self.job.job_type = job_type;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.job.payload = payload;
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.job.priority = priority;
        self
    }

    pub fn with_attempts(mut self, attempts: i32) -> Self {
        self.job.attempts = attempts;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.job.max_attempts = max_attempts;
        self
    }

    /// 同时把 `next_run_at` 设为同一时间
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.job.created_at = created_at;
        self.job.next_run_at = Some(created_at);
        self
    }

    pub fn next_run_at(mut self, next_run_at: Option<DateTime<Utc>>) -> Self {
        self.job.next_run_at = next_run_at;
        self
    }

    /// 构造一个被 `worker_id` 于 `started_at` 认领的处理中任务
    pub fn leased_by(mut self, worker_id: &str, started_at: DateTime<Utc>) -> Self {
        self.job.status = JobStatus::Processing;
        self.job.worker_id = Some(worker_id.to_string());
        self.job.started_at = Some(started_at);
        self.job.locked_at = Some(started_at);
        if self.job.attempts == 0 {
            self.job.attempts = 1;
        }
        self
    }

    pub fn with_last_error(mut self, last_error: &str) -> Self {
        self.job.last_error = Some(last_error.to_string());
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test WorkerHeartbeat entities
pub struct HeartbeatBuilder {
    heartbeat: WorkerHeartbeat,
}

impl HeartbeatBuilder {
    pub fn new(worker_id: &str) -> Self {
        Self {
            heartbeat: WorkerHeartbeat {
                worker_id: worker_id.to_string(),
                queue_name: "default".to_string(),
                hostname: "test-host".to_string(),
                version: "1.0.0".to_string(),
                pid: 4242,
                status: WorkerStatus::Healthy,
                processed_count: 0,
                failed_count: 0,
                last_seen_at: Utc::now(),
            },
        }
    }

    pub fn with_queue_name(mut self, queue_name: &str) -> Self {
        self.heartbeat.queue_name = queue_name.to_string();
        self
    }

    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.heartbeat.hostname = hostname.to_string();
        self
    }

    pub fn with_status(mut self, status: WorkerStatus) -> Self {
        self.heartbeat.status = status;
        self
    }

    pub fn with_counts(mut self, processed_count: i64, failed_count: i64) -> Self {
        self.heartbeat.processed_count = processed_count;
        self.heartbeat.failed_count = failed_count;
        self
    }

    pub fn last_seen_at(mut self, last_seen_at: DateTime<Utc>) -> Self {
        self.heartbeat.last_seen_at = last_seen_at;
        self
    }

    pub fn build(self) -> WorkerHeartbeat {
        self.heartbeat
    }
}
