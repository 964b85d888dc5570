use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use jobqueue_errors::{QueueError, QueueResult};
use serde::{Deserialize, Serialize};

use crate::services::minutes_before;

/// 在此时间内有心跳视为存活
pub const ALIVE_WITHIN_SECONDS: i64 = 120;
/// 在此时间内有心跳视为迟滞，超过则视为失联
pub const STALE_WITHIN_SECONDS: i64 = 300;

/// Worker 自报的状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Healthy,
    Draining,
    Stopped,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Healthy => "healthy",
            WorkerStatus::Draining => "draining",
            WorkerStatus::Stopped => "stopped",
        }
    }
}

impl FromStr for WorkerStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(WorkerStatus::Starting),
            "healthy" => Ok(WorkerStatus::Healthy),
            "draining" => Ok(WorkerStatus::Draining),
            "stopped" => Ok(WorkerStatus::Stopped),
            _ => Err(QueueError::InvalidStatus(s.to_string())),
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 读取时由最后心跳时间推导出的健康度，不落库
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerHealth {
    Alive,
    Stale,
    Dead,
}

impl WorkerHealth {
    pub fn classify(last_seen_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let elapsed = (now - last_seen_at).num_seconds();
        if elapsed < ALIVE_WITHIN_SECONDS {
            WorkerHealth::Alive
        } else if elapsed < STALE_WITHIN_SECONDS {
            WorkerHealth::Stale
        } else {
            WorkerHealth::Dead
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerHealth::Alive => "alive",
            WorkerHealth::Stale => "stale",
            WorkerHealth::Dead => "dead",
        }
    }
}

impl fmt::Display for WorkerHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 心跳表的一行，以 `worker_id` 为键原地覆盖
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerHeartbeat {
    pub worker_id: String,
    pub queue_name: String,
    pub hostname: String,
    pub version: String,
    pub pid: i32,
    pub status: WorkerStatus,
    pub processed_count: i64,
    pub failed_count: i64,
    pub last_seen_at: DateTime<Utc>,
}

impl WorkerHeartbeat {
    pub fn health(&self, now: DateTime<Utc>) -> WorkerHealth {
        WorkerHealth::classify(self.last_seen_at, now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaleWorker {
    pub worker_id: String,
    pub queue_name: String,
    pub hostname: String,
    pub status: WorkerStatus,
    pub last_seen_at: DateTime<Utc>,
    pub minutes_stale: i64,
}

impl StaleWorker {
    pub fn from_heartbeat(heartbeat: WorkerHeartbeat, now: DateTime<Utc>) -> Self {
        let minutes_stale = (now - heartbeat.last_seen_at).num_minutes().max(0);
        Self {
            worker_id: heartbeat.worker_id,
            queue_name: heartbeat.queue_name,
            hostname: heartbeat.hostname,
            status: heartbeat.status,
            last_seen_at: heartbeat.last_seen_at,
            minutes_stale,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerView {
    pub heartbeat: WorkerHeartbeat,
    pub health: WorkerHealth,
}

/// 按队列名聚合的处理指标，由调用方在每次任务完成后更新
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueMetrics {
    pub queue_name: String,
    pub processed_count: i64,
    pub failed_count: i64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl QueueMetrics {
    /// 第一个样本直接作为均值、最小值和最大值
    pub fn first_sample(
        queue_name: &str,
        latency_ms: f64,
        success: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            queue_name: queue_name.to_string(),
            processed_count: i64::from(success),
            failed_count: i64::from(!success),
            avg_latency_ms: latency_ms,
            min_latency_ms: latency_ms,
            max_latency_ms: latency_ms,
            last_success_at: success.then_some(now),
            updated_at: now,
        }
    }

    pub fn apply_sample(&mut self, latency_ms: f64, success: bool, now: DateTime<Utc>) {
        if success {
            self.processed_count += 1;
            self.last_success_at = Some(now);
        } else {
            self.failed_count += 1;
        }
        self.avg_latency_ms = ema(self.avg_latency_ms, latency_ms);
        self.min_latency_ms = self.min_latency_ms.min(latency_ms);
        self.max_latency_ms = self.max_latency_ms.max(latency_ms);
        self.updated_at = now;
    }
}

/// 指数移动平均：`(old*9 + sample)/10`
pub fn ema(old_avg: f64, sample: f64) -> f64 {
    (old_avg * 9.0 + sample) / 10.0
}

/// 阈值以分钟给出时的截止时间
pub fn stale_cutoff(now: DateTime<Utc>, threshold_minutes: i64) -> QueueResult<DateTime<Utc>> {
    minutes_before(now, threshold_minutes, "threshold_minutes")
}
