use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use jobqueue_errors::QueueError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 默认最大尝试次数
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;
/// 默认优先级
pub const DEFAULT_PRIORITY: i32 = 0;

/// 允许入队的任务类型（封闭枚举）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Enrich,
    SendEmail,
    Webhook,
    GenerateReport,
    Import,
    Export,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::Enrich,
        JobType::SendEmail,
        JobType::Webhook,
        JobType::GenerateReport,
        JobType::Import,
        JobType::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Enrich => "enrich",
            JobType::SendEmail => "send_email",
            JobType::Webhook => "webhook",
            JobType::GenerateReport => "generate_report",
            JobType::Import => "import",
            JobType::Export => "export",
        }
    }
}

impl FromStr for JobType {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| QueueError::invalid_job_type(s))
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务状态
///
/// `pending -> processing -> {completed | failed}`，另有回收器驱动的
/// `processing -> pending`（退避重试）与 `processing -> failed`（死信）两条边。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl FromStr for JobStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(QueueError::InvalidStatus(s.to_string())),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `report` 可接受的状态。`pending` 只能由回收器写入，因此不在此列。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_job_status(&self) -> JobStatus {
        match self {
            ReportStatus::Processing => JobStatus::Processing,
            ReportStatus::Completed => JobStatus::Completed,
            ReportStatus::Failed => JobStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.as_job_status().is_terminal()
    }
}

impl FromStr for ReportStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match JobStatus::from_str(s)? {
            JobStatus::Processing => Ok(ReportStatus::Processing),
            JobStatus::Completed => Ok(ReportStatus::Completed),
            JobStatus::Failed => Ok(ReportStatus::Failed),
            JobStatus::Pending => Err(QueueError::InvalidStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub last_error: Option<String>,
    pub reap_count: i32,
}

impl Job {
    pub fn new(job_type: JobType, payload: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type,
            payload,
            status: JobStatus::Pending,
            priority: DEFAULT_PRIORITY,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at: now,
            next_run_at: Some(now),
            started_at: None,
            locked_at: None,
            worker_id: None,
            last_error: None,
            reap_count: 0,
        }
    }

    /// 当前是否持有租约
    pub fn is_leased(&self) -> bool {
        self.status == JobStatus::Processing && self.worker_id.is_some() && self.started_at.is_some()
    }

    /// 认领资格：`pending`、已到期、且无租约或租约已过期
    pub fn is_claimable(&self, now: DateTime<Utc>, lease_timeout: Duration) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        if self.next_run_at.unwrap_or(now) > now {
            return false;
        }
        match self.locked_at {
            None => true,
            Some(locked_at) => locked_at < now - lease_timeout,
        }
    }

    /// 认领排序键中的到期时间，空值视为当前时间
    pub fn due_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.next_run_at.unwrap_or(now)
    }

    pub fn entity_description(&self) -> String {
        match &self.worker_id {
            Some(worker_id) => format!(
                "任务 {} (类型: {}, 状态: {}, Worker: {})",
                self.id, self.job_type, self.status, worker_id
            ),
            None => format!(
                "任务 {} (类型: {}, 状态: {})",
                self.id, self.job_type, self.status
            ),
        }
    }
}

/// 入队请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub run_at: Option<DateTime<Utc>>,
    pub max_attempts: Option<i32>,
}

impl NewJob {
    pub fn new(job_type: JobType, payload: serde_json::Value) -> Self {
        Self {
            job_type,
            payload,
            priority: DEFAULT_PRIORITY,
            run_at: None,
            max_attempts: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn run_at(mut self, run_at: DateTime<Utc>) -> Self {
        self.run_at = Some(run_at);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// 认领时的候选排序
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOrdering {
    /// `next_run_at`（空值视为当前时间）升序，再按 `created_at` 升序
    #[default]
    DueTime,
    /// 在 `DueTime` 之前先按 `priority` 降序
    PriorityFirst,
}

impl FromStr for ClaimOrdering {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "due_time" => Ok(ClaimOrdering::DueTime),
            "priority_first" => Ok(ClaimOrdering::PriorityFirst),
            _ => Err(QueueError::invalid_argument(format!(
                "未知的认领排序: {s}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub job_types: Vec<JobType>,
    pub lease_timeout: Duration,
    pub worker_id: String,
    pub ordering: ClaimOrdering,
}

/// 写回存储的状态报告，错误信息已截断
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub job_id: Uuid,
    pub status: ReportStatus,
    pub error_message: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// 回收器对一个卡住任务采取的动作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReapAction {
    ResetWithBackoff,
    MovedToDlq,
}

impl ReapAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReapAction::ResetWithBackoff => "reset_with_backoff",
            ReapAction::MovedToDlq => "moved_to_dlq",
        }
    }
}

impl fmt::Display for ReapAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReapedJob {
    pub job_id: Uuid,
    pub action: ReapAction,
    pub attempts: i32,
    pub max_attempts: i32,
}

/// 按任务类型与状态聚合的队列深度
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueDepth {
    pub job_type: JobType,
    pub status: JobStatus,
    pub count: i64,
}
