use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobqueue_domain::{
    entities::{ClaimOrdering, ClaimRequest, Job, JobStatus, QueueDepth, ReapedJob, StatusReport},
    repositories::JobRepository,
    services::{ReapDecision, StuckJob},
};
use jobqueue_errors::{QueueError, QueueResult};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

#[derive(Default)]
struct JobTable {
    /// 按插入顺序保存，作为同一时刻创建任务的最终排序依据
    jobs: Vec<Job>,
    index: HashMap<Uuid, usize>,
}

impl JobTable {
    fn get_mut(&mut self, id: Uuid) -> Option<&mut Job> {
        let position = *self.index.get(&id)?;
        self.jobs.get_mut(position)
    }
}

#[derive(Default)]
pub struct MemoryJobRepository {
    table: Mutex<JobTable>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn compare_candidates(a: &Job, b: &Job, ordering: ClaimOrdering, now: DateTime<Utc>) -> Ordering {
        let due_time = (a.due_at(now), a.created_at).cmp(&(b.due_at(now), b.created_at));
        match ordering {
            ClaimOrdering::DueTime => due_time,
            ClaimOrdering::PriorityFirst => Reverse(a.priority)
                .cmp(&Reverse(b.priority))
                .then(due_time),
        }
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn insert(&self, job: &Job) -> QueueResult<Job> {
        let mut table = self.table.lock().await;
        if table.index.contains_key(&job.id) {
            return Err(QueueError::database_error(format!("任务ID重复: {}", job.id)));
        }
        let position = table.jobs.len();
        table.jobs.push(job.clone());
        table.index.insert(job.id, position);

        debug!("插入任务成功: {}", job.entity_description());
        Ok(job.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> QueueResult<Option<Job>> {
        let table = self.table.lock().await;
        Ok(table
            .index
            .get(&id)
            .and_then(|position| table.jobs.get(*position))
            .cloned())
    }

    #[instrument(skip(self, request), fields(worker_id = %request.worker_id))]
    async fn claim_next(
        &self,
        request: &ClaimRequest,
        now: DateTime<Utc>,
    ) -> QueueResult<Option<Job>> {
        let mut table = self.table.lock().await;

        let candidate = table
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| request.job_types.contains(&job.job_type))
            .filter(|(_, job)| job.is_claimable(now, request.lease_timeout))
            .min_by(|(_, a), (_, b)| Self::compare_candidates(a, b, request.ordering, now))
            .map(|(position, _)| position);

        let Some(position) = candidate else {
            return Ok(None);
        };
        let Some(job) = table.jobs.get_mut(position) else {
            return Ok(None);
        };

        job.status = JobStatus::Processing;
        job.locked_at = Some(now);
        job.started_at = Some(now);
        job.worker_id = Some(request.worker_id.clone());
        job.attempts += 1;

        debug!("认领任务成功: {}", job.entity_description());
        Ok(Some(job.clone()))
    }

    async fn report_status(&self, report: &StatusReport, _now: DateTime<Utc>) -> QueueResult<bool> {
        let mut table = self.table.lock().await;
        let Some(job) = table.get_mut(report.job_id) else {
            return Ok(false);
        };
        // 只接受仍在处理中的任务，回收或终结之后的迟到上报不生效
        if job.status != JobStatus::Processing {
            return Ok(false);
        }

        job.status = report.status.as_job_status();
        if let Some(message) = &report.error_message {
            job.last_error = Some(message.clone());
        }
        if let Some(next_run_at) = report.next_run_at {
            job.next_run_at = Some(next_run_at);
        }
        if report.status.is_terminal() {
            job.locked_at = None;
            job.started_at = None;
            job.worker_id = None;
        }
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn reap_expired(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        limit: i64,
        max_error_length: usize,
    ) -> QueueResult<Vec<ReapedJob>> {
        let mut table = self.table.lock().await;

        let mut stuck_positions: Vec<(usize, DateTime<Utc>)> = table
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| job.status == JobStatus::Processing)
            .filter_map(|(position, job)| {
                job.started_at
                    .filter(|started_at| *started_at < cutoff)
                    .map(|started_at| (position, started_at))
            })
            .collect();
        stuck_positions.sort_by_key(|(_, started_at)| *started_at);
        stuck_positions.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));

        let mut reaped = Vec::with_capacity(stuck_positions.len());
        for (position, _) in stuck_positions {
            let Some(job) = table.jobs.get_mut(position) else {
                continue;
            };
            let stuck = StuckJob {
                job_id: job.id,
                attempts: job.attempts,
                max_attempts: job.max_attempts,
                worker_id: job.worker_id.clone(),
                started_at: job.started_at,
            };
            let decision = ReapDecision::decide(&stuck, now, max_error_length);

            job.status = decision.status;
            if let Some(next_run_at) = decision.next_run_at {
                job.next_run_at = Some(next_run_at);
            }
            job.last_error = Some(decision.last_error.clone());
            job.reap_count += 1;
            job.locked_at = None;
            job.started_at = None;
            job.worker_id = None;

            if decision.status.is_terminal() {
                warn!(job_id = %stuck.job_id, attempts = stuck.attempts, "任务租约超时且重试次数耗尽，已移入死信");
            }
            reaped.push(decision.to_reaped(&stuck));
        }

        Ok(reaped)
    }

    async fn count_by_status(&self) -> QueueResult<Vec<QueueDepth>> {
        let table = self.table.lock().await;
        let mut counts: BTreeMap<(&'static str, &'static str), QueueDepth> = BTreeMap::new();
        for job in &table.jobs {
            counts
                .entry((job.job_type.as_str(), job.status.as_str()))
                .or_insert_with(|| QueueDepth {
                    job_type: job.job_type,
                    status: job.status,
                    count: 0,
                })
                .count += 1;
        }
        Ok(counts.into_values().collect())
    }

    async fn list_dead_letters(&self, limit: i64) -> QueueResult<Vec<Job>> {
        let table = self.table.lock().await;
        let mut dead: Vec<Job> = table
            .jobs
            .iter()
            .rev()
            .filter(|job| {
                job.status == JobStatus::Failed
                    && job.reap_count > 0
                    && job.attempts >= job.max_attempts
            })
            .cloned()
            .collect();
        // 稳定排序，同一时刻创建的任务保持后插入者在前
        dead.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        dead.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(dead)
    }
}
