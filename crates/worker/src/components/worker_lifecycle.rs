use std::sync::Arc;
use std::time::Duration;

use jobqueue_config::WorkerConfig;
use jobqueue_dispatcher::JobQueue;
use jobqueue_domain::{JobType, QueueError, QueueResult, WorkerStatus};
use rand::Rng;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::{HeartbeatManager, JobExecutor, WorkerIdentity, WorkerState};
use crate::handler::HandlerRegistry;

/// Worker主循环
///
/// 认领到任务就立即处理并继续认领；空轮询时按带抖动的间隔休眠。
/// 关闭信号只在两次认领之间生效，正在处理的任务会先完成。
pub struct WorkerRuntime {
    queue: Arc<JobQueue>,
    identity: WorkerIdentity,
    job_types: Vec<JobType>,
    lease_timeout_minutes: i64,
    poll_interval: Duration,
    state: Arc<WorkerState>,
    executor: JobExecutor,
    heartbeat: Arc<HeartbeatManager>,
}

impl WorkerRuntime {
    pub fn new(
        queue: Arc<JobQueue>,
        registry: HandlerRegistry,
        config: &WorkerConfig,
    ) -> QueueResult<Self> {
        let identity = WorkerIdentity::detect(
            config.worker_id.clone(),
            &config.queue_name,
            &config.version,
        );
        Self::with_identity(queue, registry, config, identity)
    }

    pub fn with_identity(
        queue: Arc<JobQueue>,
        registry: HandlerRegistry,
        config: &WorkerConfig,
        identity: WorkerIdentity,
    ) -> QueueResult<Self> {
        let job_types = config
            .job_types
            .iter()
            .map(|job_type| job_type.parse::<JobType>())
            .collect::<QueueResult<Vec<_>>>()?;
        if job_types.is_empty() {
            return Err(QueueError::invalid_argument("worker.job_types 不能为空"));
        }
        if let Some(missing) = job_types.iter().find(|t| !registry.contains(**t)) {
            return Err(QueueError::invalid_argument(format!(
                "任务类型 {missing} 没有注册处理器"
            )));
        }

        let state = Arc::new(WorkerState::default());
        let executor = JobExecutor::new(
            Arc::clone(&queue),
            registry,
            identity.queue_name.clone(),
            Arc::clone(&state),
        );
        let heartbeat = Arc::new(HeartbeatManager::new(
            Arc::clone(&queue),
            identity.clone(),
            Arc::clone(&state),
            Duration::from_secs(config.heartbeat_interval_seconds),
        ));

        Ok(Self {
            queue,
            identity,
            job_types,
            lease_timeout_minutes: i64::try_from(config.lease_timeout_minutes)
                .unwrap_or(i64::MAX),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            state,
            executor,
            heartbeat,
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.identity.worker_id
    }

    pub fn state(&self) -> Arc<WorkerState> {
        Arc::clone(&self.state)
    }

    /// 认领并处理至多一个任务，返回是否处理了任务
    pub async fn poll_once(&self) -> QueueResult<bool> {
        let claimed = self
            .queue
            .claim(
                &self.job_types,
                self.lease_timeout_minutes,
                &self.identity.worker_id,
            )
            .await?;

        match claimed {
            Some(job) => {
                self.executor.execute(job).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 运行直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> QueueResult<()> {
        info!(
            worker_id = %self.identity.worker_id,
            queue_name = %self.identity.queue_name,
            "Worker启动，任务类型: {:?}",
            self.job_types
        );

        self.state.set_status(WorkerStatus::Starting);
        self.send_heartbeat().await;

        let heartbeat_handle = Arc::clone(&self.heartbeat).start(shutdown_rx.resubscribe());
        self.state.set_status(WorkerStatus::Healthy);

        loop {
            if Self::shutdown_requested(&mut shutdown_rx) {
                break;
            }

            let processed = match self.poll_once().await {
                Ok(processed) => processed,
                Err(e) => {
                    error!("轮询任务失败: {}", e);
                    false
                }
            };
            if processed {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.jittered_poll_interval()) => {}
                _ = shutdown_rx.recv() => break,
            }
        }

        info!(worker_id = %self.identity.worker_id, "收到关闭信号，Worker停止认领");
        self.state.set_status(WorkerStatus::Draining);
        self.send_heartbeat().await;

        if let Err(e) = heartbeat_handle.await {
            warn!("等待心跳任务退出失败: {}", e);
        }

        self.state.set_status(WorkerStatus::Stopped);
        self.send_heartbeat().await;
        info!(
            worker_id = %self.identity.worker_id,
            processed = self.state.processed_count(),
            failed = self.state.failed_count(),
            "Worker已停止"
        );
        Ok(())
    }

    fn shutdown_requested(shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
        !matches!(
            shutdown_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        )
    }

    /// 在配置间隔的 ±20% 内随机，避免多个Worker同步轮询
    fn jittered_poll_interval(&self) -> Duration {
        let factor = rand::rng().random_range(0.8..=1.2);
        self.poll_interval.mul_f64(factor)
    }

    async fn send_heartbeat(&self) {
        if let Err(e) = self.heartbeat.send().await {
            error!("发送心跳失败: {}", e);
        }
    }
}
