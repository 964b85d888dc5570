use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jobqueue_config::AppConfig;
use jobqueue_dispatcher::{JobQueue, QueueSettings, ReaperService};
use jobqueue_domain::{JobType, NewJob};
use jobqueue_infrastructure::{init_metrics, DatabaseManager};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::info;

/// 入队命令的参数
#[derive(Debug, Clone)]
pub struct EnqueueArgs {
    pub job_type: String,
    pub payload: String,
    pub priority: i32,
    pub run_at: Option<String>,
    pub max_attempts: Option<i32>,
}

/// 命令行各子命令共用的应用上下文
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    queue: Arc<JobQueue>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接存储失败")?;
        let settings = QueueSettings::from_config(&config.queue, &config.reaper)
            .context("队列配置无效")?;
        let queue = Arc::new(JobQueue::with_system_clock(
            database.repositories(),
            settings,
        ));

        Ok(Self {
            config,
            database,
            queue,
        })
    }

    pub async fn migrate(&self) -> Result<Value> {
        self.database.migrate().await.context("数据库迁移失败")?;
        Ok(json!({ "migrated": true, "backend": format!("{:?}", self.database.database_type()) }))
    }

    pub async fn enqueue(&self, args: EnqueueArgs) -> Result<Value> {
        let job_type: JobType = args.job_type.parse()?;
        let payload: Value =
            serde_json::from_str(&args.payload).context("payload 不是合法的JSON")?;

        let mut new_job = NewJob::new(job_type, payload).with_priority(args.priority);
        if let Some(run_at) = args.run_at.as_deref() {
            new_job = new_job.run_at(parse_run_at(run_at)?);
        }
        if let Some(max_attempts) = args.max_attempts {
            new_job = new_job.with_max_attempts(max_attempts);
        }

        let job_id = self.queue.enqueue(new_job).await?;
        Ok(json!({ "job_id": job_id }))
    }

    pub async fn reap(&self, lease_timeout_minutes: Option<u64>) -> Result<Value> {
        let minutes = lease_timeout_minutes.unwrap_or(self.config.reaper.lease_timeout_minutes);
        let minutes = i64::try_from(minutes).context("lease_timeout_minutes 超出范围")?;
        let reaped = self.queue.reap(minutes).await?;
        Ok(serde_json::to_value(reaped)?)
    }

    /// 常驻回收循环，直到收到关闭信号
    pub async fn run_reaper(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if let Some(address) = &self.config.observability.metrics_listen_address {
            init_metrics(address)?;
        }

        let reaper = ReaperService::new(Arc::clone(&self.queue), &self.config.reaper);
        reaper.run(shutdown_rx).await?;
        self.database.close().await;
        info!("回收服务已关闭");
        Ok(())
    }

    pub async fn stale_workers(&self, threshold_minutes: i64) -> Result<Value> {
        let stale = self.queue.find_stale_workers(threshold_minutes).await?;
        Ok(serde_json::to_value(stale)?)
    }

    pub async fn stats(&self) -> Result<Value> {
        let depth = self.queue.queue_depth().await?;
        let workers = self.queue.list_workers().await?;
        let queue_name = &self.config.worker.queue_name;
        let metrics = self.queue.get_queue_metrics(queue_name).await?;

        Ok(json!({
            "queue_depth": depth,
            "workers": workers,
            "queue_metrics": metrics,
        }))
    }

    pub async fn dead_letters(&self, limit: i64) -> Result<Value> {
        let jobs = self.queue.list_dead_letters(limit).await?;
        Ok(serde_json::to_value(jobs)?)
    }
}

/// 接受RFC 3339时间，或相对当前时间的秒数（如 `+300`）
fn parse_run_at(value: &str) -> Result<DateTime<Utc>> {
    if let Some(seconds) = value.strip_prefix('+') {
        let seconds: i64 = seconds
            .parse()
            .with_context(|| format!("无效的相对时间: {value}"))?;
        return chrono::Duration::try_seconds(seconds)
            .and_then(|offset| Utc::now().checked_add_signed(offset))
            .with_context(|| format!("相对时间超出范围: {value}"));
    }
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("无效的时间: {value}"))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobqueue_config::DatabaseConfig;

    fn memory_config() -> AppConfig {
        AppConfig {
            database: DatabaseConfig {
                url: "memory://".to_string(),
                ..DatabaseConfig::default()
            },
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_parse_run_at() {
        let at = parse_run_at("2030-01-02T03:04:05Z").unwrap();
        assert_eq!(at.to_rfc3339(), "2030-01-02T03:04:05+00:00");

        let relative = parse_run_at("+60").unwrap();
        assert!(relative > Utc::now());

        assert!(parse_run_at("tomorrow").is_err());
        assert!(parse_run_at(&format!("+{}", i64::MAX)).is_err());
    }

    #[tokio::test]
    async fn test_enqueue_and_stats_on_memory_backend() {
        let app = Application::new(memory_config()).await.unwrap();
        app.migrate().await.unwrap();

        let result = app
            .enqueue(EnqueueArgs {
                job_type: "webhook".to_string(),
                payload: r#"{"url": "https://example.com"}"#.to_string(),
                priority: 3,
                run_at: None,
                max_attempts: Some(2),
            })
            .await
            .unwrap();
        assert!(result["job_id"].is_string());

        let stats = app.stats().await.unwrap();
        assert_eq!(stats["queue_depth"][0]["job_type"], "webhook");
        assert_eq!(stats["queue_depth"][0]["count"], 1);

        assert_eq!(app.reap(None).await.unwrap(), json!([]));
        assert_eq!(app.dead_letters(10).await.unwrap(), json!([]));
        assert_eq!(app.stale_workers(5).await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn test_out_of_range_minutes_are_rejected() {
        let app = Application::new(memory_config()).await.unwrap();
        assert!(app.reap(Some(u64::MAX)).await.is_err());
        assert!(app.reap(Some(i64::MAX as u64)).await.is_err());
        assert!(app.stale_workers(i64::MAX).await.is_err());
    }

    #[tokio::test]
    async fn test_enqueue_rejects_bad_input() {
        let app = Application::new(memory_config()).await.unwrap();
        let args = EnqueueArgs {
            job_type: "unknown".to_string(),
            payload: "{}".to_string(),
            priority: 0,
            run_at: None,
            max_attempts: None,
        };
        assert!(app.enqueue(args.clone()).await.is_err());

        let args = EnqueueArgs {
            job_type: "enrich".to_string(),
            payload: "{not json".to_string(),
            ..args
        };
        assert!(app.enqueue(args).await.is_err());
    }
}
