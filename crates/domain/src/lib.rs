//! # 任务队列领域层
//!
//! 定义任务、心跳等实体，队列的纯规则（退避、回收判定、健康分级），
//! 以及存储层需要实现的仓储抽象。本crate不做任何I/O。

pub mod clock;
pub mod entities;
pub mod repositories;
pub mod services;
pub mod sqlx_impls;
pub mod worker;

pub use clock::*;
pub use entities::*;
pub use jobqueue_errors::{QueueError, QueueResult};
pub use repositories::*;
pub use services::*;
pub use worker::*;
