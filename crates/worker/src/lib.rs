//! 可嵌入的Worker运行时
//!
//! 业务方为每种任务类型实现 [`JobHandler`]，交给 [`WorkerRuntime`] 轮询认领、
//! 执行并报告结果，同时周期性上报心跳。

pub mod components;
pub mod handler;

pub use components::{HeartbeatManager, JobExecutor, WorkerIdentity, WorkerRuntime, WorkerState};
pub use handler::{HandlerRegistry, JobHandler, JobOutcome};
