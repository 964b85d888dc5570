pub mod sqlite_heartbeat_repository;
pub mod sqlite_job_repository;
pub mod sqlite_queue_metrics_repository;

pub use sqlite_heartbeat_repository::*;
pub use sqlite_job_repository::*;
pub use sqlite_queue_metrics_repository::*;

use chrono::{DateTime, Utc};
use jobqueue_errors::{QueueError, QueueResult};

// SQLite中的时间列统一存为UTC毫秒时间戳，保证排序与比较按数值进行

pub(crate) fn to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

pub(crate) fn from_millis(value: i64) -> QueueResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| QueueError::database_error(format!("无效的时间戳: {value}")))
}

pub(crate) fn opt_from_millis(value: Option<i64>) -> QueueResult<Option<DateTime<Utc>>> {
    value.map(from_millis).transpose()
}
