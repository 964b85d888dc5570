pub mod postgres_heartbeat_repository;
pub mod postgres_job_repository;
pub mod postgres_queue_metrics_repository;

pub use postgres_heartbeat_repository::*;
pub use postgres_job_repository::*;
pub use postgres_queue_metrics_repository::*;
