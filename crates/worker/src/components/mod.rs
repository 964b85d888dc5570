pub mod heartbeat_manager;
pub mod job_execution;
pub mod worker_lifecycle;

pub use heartbeat_manager::{HeartbeatManager, WorkerIdentity, WorkerState};
pub use job_execution::JobExecutor;
pub use worker_lifecycle::WorkerRuntime;
