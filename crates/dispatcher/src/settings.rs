use jobqueue_config::{QueueConfig, ReaperConfig};
use jobqueue_domain::{ClaimOrdering, QueueResult, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_ERROR_LENGTH};

/// 队列运行参数
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSettings {
    pub default_max_attempts: i32,
    pub max_error_length: usize,
    pub claim_ordering: ClaimOrdering,
    /// 单次 `reap` 处理的最大行数
    pub reap_batch_size: i64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_error_length: DEFAULT_MAX_ERROR_LENGTH,
            claim_ordering: ClaimOrdering::DueTime,
            reap_batch_size: 100,
        }
    }
}

impl QueueSettings {
    pub fn from_config(queue: &QueueConfig, reaper: &ReaperConfig) -> QueueResult<Self> {
        Ok(Self {
            default_max_attempts: queue.default_max_attempts,
            max_error_length: queue.max_error_length,
            claim_ordering: queue.claim_ordering.parse()?,
            reap_batch_size: i64::from(reaper.batch_size),
        })
    }

    pub fn with_claim_ordering(mut self, claim_ordering: ClaimOrdering) -> Self {
        self.claim_ordering = claim_ordering;
        self
    }

    pub fn with_reap_batch_size(mut self, reap_batch_size: i64) -> Self {
        self.reap_batch_size = reap_batch_size;
        self
    }
}
