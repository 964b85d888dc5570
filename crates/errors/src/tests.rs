use crate::*;

#[test]
fn test_queue_error_display() {
    let err = QueueError::InvalidJobType("resize".to_string());
    assert_eq!(err.to_string(), "未知的任务类型: resize");

    let err = QueueError::DatabaseOperation("Connection failed".to_string());
    assert_eq!(err.to_string(), "数据库操作错误: Connection failed");

    let id = Uuid::nil();
    let err = QueueError::job_not_found(id);
    assert_eq!(
        err.to_string(),
        "任务未找到: 00000000-0000-0000-0000-000000000000"
    );

    let err = QueueError::invalid_argument("worker_id cannot be empty");
    assert_eq!(err.to_string(), "无效的参数: worker_id cannot be empty");
}

#[test]
fn test_validation_classification() {
    assert!(QueueError::invalid_job_type("x").is_validation());
    assert!(QueueError::InvalidStatus("pending".to_string()).is_validation());
    assert!(QueueError::invalid_argument("x").is_validation());
    assert!(!QueueError::Internal("x".to_string()).is_validation());
    assert!(!QueueError::job_not_found(Uuid::nil()).is_validation());
}

#[test]
fn test_retryable_classification() {
    assert!(QueueError::Database(sqlx::Error::PoolTimedOut).is_retryable());
    assert!(QueueError::database_error("deadlock").is_retryable());
    assert!(!QueueError::Database(sqlx::Error::RowNotFound).is_retryable());
    assert!(!QueueError::invalid_job_type("x").is_retryable());
}

#[test]
fn test_conversions() {
    let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let err: QueueError = json_err.into();
    assert!(matches!(err, QueueError::Serialization(_)));

    let err: QueueError = anyhow::anyhow!("boom").into();
    assert!(matches!(err, QueueError::Internal(ref msg) if msg == "boom"));
}

#[test]
fn test_user_message() {
    assert_eq!(
        QueueError::invalid_job_type("x").user_message(),
        "任务类型不在允许列表中"
    );
    assert_eq!(
        QueueError::Internal("x".to_string()).user_message(),
        "系统繁忙，请稍后重试"
    );
}
