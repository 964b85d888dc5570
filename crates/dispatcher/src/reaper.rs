use std::sync::Arc;
use std::time::Duration;

use jobqueue_config::ReaperConfig;
use jobqueue_domain::{QueueResult, ReapAction, ReapedJob};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::queue::JobQueue;

/// 周期性回收服务
///
/// 每个周期先回收一批，若回收数达到批量上限则立即继续，直到积压清空。
pub struct ReaperService {
    queue: Arc<JobQueue>,
    lease_timeout_minutes: i64,
    interval: Duration,
}

impl ReaperService {
    pub fn new(queue: Arc<JobQueue>, config: &ReaperConfig) -> Self {
        Self {
            queue,
            lease_timeout_minutes: i64::try_from(config.lease_timeout_minutes).unwrap_or(i64::MAX),
            interval: Duration::from_secs(config.interval_seconds),
        }
    }

    /// 执行一个回收周期
    pub async fn run_once(&self) -> QueueResult<Vec<ReapedJob>> {
        let batch_size = usize::try_from(self.queue.settings().reap_batch_size).unwrap_or(0);
        let mut all_reaped = Vec::new();

        loop {
            let reaped = self.queue.reap(self.lease_timeout_minutes).await?;
            let full_batch = batch_size > 0 && reaped.len() >= batch_size;
            all_reaped.extend(reaped);
            if !full_batch {
                break;
            }
        }

        if !all_reaped.is_empty() {
            let moved_to_dlq = all_reaped
                .iter()
                .filter(|r| r.action == ReapAction::MovedToDlq)
                .count();
            info!(
                "本轮回收 {} 个任务，其中 {} 个移入死信",
                all_reaped.len(),
                moved_to_dlq
            );
        }
        Ok(all_reaped)
    }

    /// 循环运行直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> QueueResult<()> {
        info!(
            "回收服务启动，租约超时 {} 分钟，间隔 {:?}",
            self.lease_timeout_minutes, self.interval
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!("回收周期执行失败: {}", e);
                    }
                    if let Err(e) = self.queue.queue_depth().await {
                        error!("刷新队列深度失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，回收服务退出");
                    break;
                }
            }
        }
        Ok(())
    }
}
