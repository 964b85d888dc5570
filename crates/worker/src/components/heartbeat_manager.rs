use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use jobqueue_dispatcher::{HeartbeatRequest, JobQueue};
use jobqueue_domain::{QueueResult, WorkerStatus};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// 心跳中不随时间变化的部分
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub worker_id: String,
    pub queue_name: String,
    pub hostname: String,
    pub version: String,
    pub pid: i32,
}

impl WorkerIdentity {
    /// 未配置 `worker_id` 时使用 `主机名-进程号`
    pub fn detect(worker_id: Option<String>, queue_name: &str, version: &str) -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        let pid = i32::try_from(std::process::id()).unwrap_or(i32::MAX);
        let worker_id = worker_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("{hostname}-{pid}"));

        Self {
            worker_id,
            queue_name: queue_name.to_string(),
            hostname,
            version: version.to_string(),
            pid,
        }
    }
}

/// Worker的运行状态与累计计数，执行器与心跳任务共享
#[derive(Debug)]
pub struct WorkerState {
    status: RwLock<WorkerStatus>,
    processed_count: AtomicI64,
    failed_count: AtomicI64,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self {
            status: RwLock::new(WorkerStatus::Starting),
            processed_count: AtomicI64::new(0),
            failed_count: AtomicI64::new(0),
        }
    }
}

impl WorkerState {
    pub fn status(&self) -> WorkerStatus {
        *self.status.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_status(&self, status: WorkerStatus) {
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn record(&self, success: bool) {
        if success {
            self.processed_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn processed_count(&self) -> i64 {
        self.processed_count.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> i64 {
        self.failed_count.load(Ordering::Relaxed)
    }
}

pub struct HeartbeatManager {
    queue: Arc<JobQueue>,
    identity: WorkerIdentity,
    state: Arc<WorkerState>,
    heartbeat_interval: Duration,
}

impl HeartbeatManager {
    pub fn new(
        queue: Arc<JobQueue>,
        identity: WorkerIdentity,
        state: Arc<WorkerState>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            queue,
            identity,
            state,
            heartbeat_interval,
        }
    }

    /// 立即上报一次当前状态
    pub async fn send(&self) -> QueueResult<()> {
        self.queue
            .heartbeat(HeartbeatRequest {
                worker_id: self.identity.worker_id.clone(),
                queue_name: self.identity.queue_name.clone(),
                hostname: self.identity.hostname.clone(),
                version: self.identity.version.clone(),
                pid: self.identity.pid,
                status: self.state.status(),
                processed_count: self.state.processed_count(),
                failed_count: self.state.failed_count(),
            })
            .await
    }

    /// 启动后台心跳任务，收到关闭信号后退出
    pub fn start(
        self: Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let mut ticker = interval(self.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.send().await {
                            Ok(()) => debug!(worker_id = %self.identity.worker_id, "心跳已发送"),
                            Err(e) => error!("发送心跳失败: {}", e),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("心跳任务退出");
                        break;
                    }
                }
            }
        })
    }
}
