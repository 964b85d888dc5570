//! 队列操作入口
//!
//! `JobQueue` 把仓储、时钟与进程内指标组装成对外的六个操作
//! （入队、认领、报告、回收、心跳、陈旧Worker查询）以及若干只读查询；
//! `ReaperService` 按固定间隔驱动回收。

pub mod queue;
pub mod reaper;
pub mod settings;

pub use queue::{HeartbeatRequest, JobQueue};
pub use reaper::ReaperService;
pub use settings::QueueSettings;
