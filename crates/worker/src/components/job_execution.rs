use std::sync::Arc;
use std::time::Instant;

use jobqueue_dispatcher::JobQueue;
use jobqueue_domain::{Job, QueueResult, ReportStatus};
use tracing::{error, info, warn};

use super::WorkerState;
use crate::handler::{HandlerRegistry, JobOutcome};

/// 执行一个已认领的任务，并且每次尝试只报告一次
pub struct JobExecutor {
    queue: Arc<JobQueue>,
    registry: HandlerRegistry,
    queue_name: String,
    state: Arc<WorkerState>,
}

impl JobExecutor {
    pub fn new(
        queue: Arc<JobQueue>,
        registry: HandlerRegistry,
        queue_name: String,
        state: Arc<WorkerState>,
    ) -> Self {
        Self {
            queue,
            registry,
            queue_name,
            state,
        }
    }

    /// 返回处理器的结果。租约已被回收或任务已不存在时，报告不生效，只记录日志。
    pub async fn execute(&self, job: Job) -> QueueResult<JobOutcome> {
        let started = Instant::now();
        let outcome = self.run_handler(&job).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let found = match &outcome {
            JobOutcome::Completed => {
                self.queue
                    .report(job.id, ReportStatus::Completed, None, None)
                    .await?
            }
            JobOutcome::Failed(message) => {
                self.queue
                    .report(job.id, ReportStatus::Failed, Some(message), None)
                    .await?
            }
        };
        if !found {
            warn!(job_id = %job.id, "任务已不在处理中或已不存在，本次结果未写入");
        }

        self.state.record(outcome.is_success());
        if let Err(e) = self
            .queue
            .record_completion(&self.queue_name, latency_ms, outcome.is_success())
            .await
        {
            error!("更新队列指标失败: {}", e);
        }

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            success = outcome.is_success(),
            "任务处理完成，耗时 {:.1}ms",
            latency_ms
        );
        Ok(outcome)
    }

    /// 处理器在独立任务中运行，panic 会被转换为失败结果
    async fn run_handler(&self, job: &Job) -> JobOutcome {
        let Some(handler) = self.registry.get(job.job_type) else {
            return JobOutcome::Failed(format!("没有为任务类型 {} 注册处理器", job.job_type));
        };

        let owned = job.clone();
        match tokio::spawn(async move { handler.handle(&owned).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job_id = %job.id, "任务处理器异常退出: {}", e);
                JobOutcome::Failed(format!("处理器异常退出: {e}"))
            }
        }
    }
}
