pub mod manager;
pub mod memory;
pub mod postgres;
pub mod sqlite;

pub use manager::{DatabaseManager, DatabasePool, DatabaseType, Repositories};
pub use memory::{MemoryHeartbeatRepository, MemoryJobRepository, MemoryQueueMetricsRepository};
pub use postgres::{
    PostgresHeartbeatRepository, PostgresJobRepository, PostgresQueueMetricsRepository,
};
pub use sqlite::{SqliteHeartbeatRepository, SqliteJobRepository, SqliteQueueMetricsRepository};
