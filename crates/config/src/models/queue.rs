use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

pub const CLAIM_ORDERINGS: [&str; 2] = ["due_time", "priority_first"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub default_max_attempts: i32,
    /// `last_error` 的最大字符数
    pub max_error_length: usize,
    /// `due_time`：按到期时间、创建时间；`priority_first`：先按优先级降序
    pub claim_ordering: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 5,
            max_error_length: 2000,
            claim_ordering: "due_time".to_string(),
        }
    }
}

impl ConfigValidator for QueueConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.default_max_attempts < 1 {
            return Err(crate::ConfigError::Validation(
                "queue.default_max_attempts must be greater than 0".to_string(),
            ));
        }
        ValidationUtils::validate_range(
            self.max_error_length as u64,
            1,
            100_000,
            "queue.max_error_length",
        )?;
        ValidationUtils::validate_one_of(
            &self.claim_ordering,
            &CLAIM_ORDERINGS,
            "queue.claim_ordering",
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub lease_timeout_minutes: u64,
    pub interval_seconds: u64,
    /// 单次回收处理的最大行数
    pub batch_size: u32,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            lease_timeout_minutes: 30,
            interval_seconds: 60,
            batch_size: 100,
        }
    }
}

impl ConfigValidator for ReaperConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_range(
            self.lease_timeout_minutes,
            1,
            7 * 24 * 60,
            "reaper.lease_timeout_minutes",
        )?;
        ValidationUtils::validate_timeout_seconds(self.interval_seconds, "reaper.interval_seconds")?;
        ValidationUtils::validate_count(self.batch_size as usize, "reaper.batch_size")?;
        Ok(())
    }
}
