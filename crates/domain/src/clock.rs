use chrono::{DateTime, Utc};

/// 时间来源。所有存储操作都以调用方给出的 `now` 为准，便于在测试中推进时间。
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
