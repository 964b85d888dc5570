use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("未知的任务类型: {0}")]
    InvalidJobType(String),
    #[error("无效的任务状态: {0}")]
    InvalidStatus(String),
    #[error("无效的参数: {0}")]
    InvalidArgument(String),
    #[error("任务未找到: {id}")]
    JobNotFound { id: Uuid },
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

impl QueueError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn job_not_found(id: Uuid) -> Self {
        Self::JobNotFound { id }
    }
    pub fn invalid_job_type<S: Into<String>>(job_type: S) -> Self {
        Self::InvalidJobType(job_type.into())
    }
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 调用方输入有误，同步拒绝且从不落库
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            QueueError::InvalidJobType(_)
                | QueueError::InvalidStatus(_)
                | QueueError::InvalidArgument(_)
        )
    }

    /// 存储层的瞬时故障，调用方可以在下一轮轮询时重试
    pub fn is_retryable(&self) -> bool {
        match self {
            QueueError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            QueueError::DatabaseOperation(_) => true,
            _ => false,
        }
    }

    pub fn user_message(&self) -> &str {
        match self {
            QueueError::InvalidJobType(_) => "任务类型不在允许列表中",
            QueueError::InvalidStatus(_) => "任务状态取值有误",
            QueueError::InvalidArgument(_) => "请求参数有误",
            QueueError::JobNotFound { .. } => "请求的任务不存在",
            QueueError::Configuration(_) => "系统配置有误",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for QueueError {
    fn from(err: anyhow::Error) -> Self {
        QueueError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests;
