//! # 队列规则
//!
//! 与存储无关的纯函数：回收器的退避计算、卡住任务的处置判定、
//! 错误信息截断。三种存储实现共用这些规则，保证行为一致。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{JobStatus, ReapAction, ReapedJob};
use crate::{QueueError, QueueResult};

/// 退避基数（秒）
pub const BASE_BACKOFF_SECONDS: u64 = 30;
/// 退避上限（秒）
pub const MAX_BACKOFF_SECONDS: u64 = 3600;
/// `last_error` 的默认长度上限（字符）
pub const DEFAULT_MAX_ERROR_LENGTH: usize = 2000;

/// 回收器退避：`min(2^attempts * 30, 3600)` 秒
pub fn reaper_backoff_seconds(attempts: i32) -> i64 {
    let exponent = attempts.max(0) as u32;
    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let seconds = factor
        .saturating_mul(BASE_BACKOFF_SECONDS)
        .min(MAX_BACKOFF_SECONDS);
    seconds as i64
}

/// 按字符截断，不会切断多字节字符
pub fn truncate_error(message: &str, max_len: usize) -> String {
    match message.char_indices().nth(max_len) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

/// `now` 之前 `minutes` 分钟的时刻，超出可表示的时间范围时返回参数错误
pub fn minutes_before(now: DateTime<Utc>, minutes: i64, name: &str) -> QueueResult<DateTime<Utc>> {
    Duration::try_minutes(minutes)
        .and_then(|offset| now.checked_sub_signed(offset))
        .ok_or_else(|| QueueError::invalid_argument(format!("{name} 超出范围: {minutes}")))
}

/// `now` 之后 `seconds` 秒的时刻，超出可表示的时间范围时返回参数错误
pub fn seconds_after(now: DateTime<Utc>, seconds: i64, name: &str) -> QueueResult<DateTime<Utc>> {
    Duration::try_seconds(seconds)
        .and_then(|offset| now.checked_add_signed(offset))
        .ok_or_else(|| QueueError::invalid_argument(format!("{name} 超出范围: {seconds}")))
}

/// 回收器扫描到的一个租约过期任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StuckJob {
    pub job_id: Uuid,
    pub attempts: i32,
    pub max_attempts: i32,
    pub worker_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// 对卡住任务的处置结果，由存储层原样写回
#[derive(Debug, Clone, PartialEq)]
pub struct ReapDecision {
    pub action: ReapAction,
    pub status: JobStatus,
    /// 为 `None` 时保持原值
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_error: String,
}

impl ReapDecision {
    pub fn decide(stuck: &StuckJob, now: DateTime<Utc>, max_error_length: usize) -> Self {
        let worker = stuck.worker_id.as_deref().unwrap_or("unknown");
        let started = stuck
            .started_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());

        if stuck.attempts >= stuck.max_attempts {
            let message = format!(
                "租约超时且已达最大尝试次数 ({}/{})，已移入死信; 最后Worker: {}, 开始时间: {}",
                stuck.attempts, stuck.max_attempts, worker, started
            );
            Self {
                action: ReapAction::MovedToDlq,
                status: JobStatus::Failed,
                next_run_at: None,
                last_error: truncate_error(&message, max_error_length),
            }
        } else {
            let backoff = reaper_backoff_seconds(stuck.attempts);
            let message = format!(
                "租约超时被回收器收回 (第 {} 次尝试, Worker: {}, 开始时间: {})，{} 秒后重试",
                stuck.attempts, worker, started, backoff
            );
            Self {
                action: ReapAction::ResetWithBackoff,
                status: JobStatus::Pending,
                next_run_at: Some(now + Duration::seconds(backoff)),
                last_error: truncate_error(&message, max_error_length),
            }
        }
    }

    pub fn to_reaped(&self, stuck: &StuckJob) -> ReapedJob {
        ReapedJob {
            job_id: stuck.job_id,
            action: self.action,
            attempts: stuck.attempts,
            max_attempts: stuck.max_attempts,
        }
    }
}
