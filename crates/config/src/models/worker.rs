use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 允许的任务类型名，与领域层的 `JobType` 保持一致
pub const KNOWN_JOB_TYPES: [&str; 6] = [
    "enrich",
    "send_email",
    "webhook",
    "generate_report",
    "import",
    "export",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 为空时由主机名和进程号生成
    pub worker_id: Option<String>,
    pub queue_name: String,
    pub job_types: Vec<String>,
    pub lease_timeout_minutes: u64,
    pub poll_interval_ms: u64,
    pub heartbeat_interval_seconds: u64,
    pub version: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: None,
            queue_name: "default".to_string(),
            job_types: KNOWN_JOB_TYPES.iter().map(|t| t.to_string()).collect(),
            lease_timeout_minutes: 30,
            poll_interval_ms: 1000,
            heartbeat_interval_seconds: 30,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ConfigValidator for WorkerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if let Some(worker_id) = &self.worker_id {
            ValidationUtils::validate_not_empty(worker_id, "worker.worker_id")?;
        }
        ValidationUtils::validate_not_empty(&self.queue_name, "worker.queue_name")?;
        ValidationUtils::validate_not_empty(&self.version, "worker.version")?;

        if self.job_types.is_empty() {
            return Err(crate::ConfigError::Validation(
                "worker.job_types cannot be empty".to_string(),
            ));
        }
        for job_type in &self.job_types {
            ValidationUtils::validate_one_of(job_type, &KNOWN_JOB_TYPES, "worker.job_types")?;
        }

        ValidationUtils::validate_range(
            self.lease_timeout_minutes,
            1,
            7 * 24 * 60,
            "worker.lease_timeout_minutes",
        )?;
        ValidationUtils::validate_range(self.poll_interval_ms, 10, 600_000, "worker.poll_interval_ms")?;
        ValidationUtils::validate_timeout_seconds(
            self.heartbeat_interval_seconds,
            "worker.heartbeat_interval_seconds",
        )?;

        Ok(())
    }
}
