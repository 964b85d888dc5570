use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobqueue_config::{AppConfig, LogFormat};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod shutdown;

use app::{Application, EnqueueArgs};
use shutdown::ShutdownManager;

#[derive(Parser, Debug)]
#[command(name = "jobqueue")]
#[command(version)]
#[command(about = "持久化多Worker任务队列 - 运维命令行")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径，缺省时按默认位置查找
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_parser = ["json", "pretty"])]
    log_format: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 执行数据库迁移
    Migrate,
    /// 入队一个任务
    Enqueue {
        #[arg(long)]
        job_type: String,
        /// JSON格式的任务载荷
        #[arg(long, default_value = "{}")]
        payload: String,
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// RFC 3339时间，或 `+秒数`
        #[arg(long)]
        run_at: Option<String>,
        #[arg(long)]
        max_attempts: Option<i32>,
    },
    /// 执行一次回收，适合由外部cron调用
    Reap {
        #[arg(long)]
        lease_timeout_minutes: Option<u64>,
    },
    /// 常驻运行回收循环，直到收到SIGINT/SIGTERM
    Reaper,
    /// 列出超过阈值未上报心跳的Worker
    StaleWorkers {
        #[arg(long, default_value_t = 5)]
        threshold_minutes: i64,
    },
    /// 队列深度、Worker健康度与队列指标
    Stats,
    /// 列出死信任务
    DeadLetters {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).with_context(|| {
        format!(
            "加载配置失败: {}",
            cli.config.as_deref().unwrap_or("<默认路径>")
        )
    })?;

    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.observability.log_level.clone());
    let log_format = cli.log_format.clone().unwrap_or_else(|| {
        match config.observability.log_format {
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
        .to_string()
    });
    init_logging(&log_level, &log_format)?;

    let app = Application::new(config).await?;

    let output = match cli.command {
        Commands::Migrate => app.migrate().await?,
        Commands::Enqueue {
            job_type,
            payload,
            priority,
            run_at,
            max_attempts,
        } => {
            app.enqueue(EnqueueArgs {
                job_type,
                payload,
                priority,
                run_at,
                max_attempts,
            })
            .await?
        }
        Commands::Reap {
            lease_timeout_minutes,
        } => app.reap(lease_timeout_minutes).await?,
        Commands::Reaper => {
            run_reaper(app).await?;
            return Ok(());
        }
        Commands::StaleWorkers { threshold_minutes } => {
            app.stale_workers(threshold_minutes).await?
        }
        Commands::Stats => app.stats().await?,
        Commands::DeadLetters { limit } => app.dead_letters(limit).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_reaper(app: Application) -> Result<()> {
    info!("启动回收服务");
    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;

    let handle = tokio::spawn(async move {
        if let Err(e) = app.run_reaper(shutdown_rx).await {
            error!("回收服务运行失败: {e}");
        }
    });

    wait_for_shutdown_signal().await?;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), handle).await {
        Ok(Ok(())) => info!("回收服务已优雅关闭"),
        Ok(Err(e)) => error!("回收服务关闭时发生错误: {e}"),
        Err(_) => warn!("回收服务关闭超时，强制退出"),
    }
    Ok(())
}

/// 初始化日志系统，`RUST_LOG` 优先于配置
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 命令输出走stdout，日志写到stderr
    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 等待SIGINT或SIGTERM
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("安装SIGTERM信号处理器失败")?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("安装Ctrl+C信号处理器失败")?;
                info!("收到Ctrl+C信号");
            },
            _ = terminate.recv() => {
                info!("收到SIGTERM信号");
            },
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("安装Ctrl+C信号处理器失败")?;
        info!("收到Ctrl+C信号");
    }

    Ok(())
}
