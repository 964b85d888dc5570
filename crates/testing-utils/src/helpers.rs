use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// 已执行迁移的SQLite内存库。内存库随连接消失，所以只保留一个连接。
pub async fn sqlite_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("../../migrations/sqlite").run(&pool).await?;
    Ok(pool)
}

/// 临时目录中的SQLite文件库，连接池有多个连接，用于并发测试。
/// 目录在本结构drop时删除，所以要与连接池一起持有。
pub struct SqliteFileDatabase {
    pub pool: SqlitePool,
    _dir: TempDir,
}

pub async fn sqlite_file_database(max_connections: u32) -> Result<SqliteFileDatabase> {
    let dir = tempfile::tempdir()?;
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("jobqueue.db"))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(30));
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(max_connections)
        .connect_with(options)
        .await?;
    sqlx::migrate!("../../migrations/sqlite").run(&pool).await?;
    Ok(SqliteFileDatabase { pool, _dir: dir })
}

/// Set up logging for tests (call once per test binary)
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}
