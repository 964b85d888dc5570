//! # JobQueue Testing Utils
//!
//! 各crate共用的测试工具：
//!
//! - **Builders**: 带合理默认值的 `Job` / `WorkerHeartbeat` 构造器
//! - **ManualClock**: 可手动推进的时钟，用于租约超时与退避相关的测试
//! - **Containers**: 已执行迁移的PostgreSQL测试容器
//! - **Helpers**: 已执行迁移的SQLite内存库与多连接文件库、测试日志初始化
//!
//! ```toml
//! [dev-dependencies]
//! jobqueue-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod clock;
pub mod containers;
pub mod helpers;

pub use builders::*;
pub use clock::*;
pub use containers::*;
pub use helpers::*;
