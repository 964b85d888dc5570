//! 进程内存储
//!
//! 每个仓储由一把互斥锁守护，认领与回收在锁内完成选择和改写，
//! 相当于单写者仲裁。用于测试和 `memory://` 连接串，不做持久化。

pub mod memory_heartbeat_repository;
pub mod memory_job_repository;
pub mod memory_queue_metrics_repository;

pub use memory_heartbeat_repository::*;
pub use memory_job_repository::*;
pub use memory_queue_metrics_repository::*;
