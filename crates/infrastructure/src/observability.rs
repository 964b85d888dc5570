//! 进程内指标
//!
//! 通过 `metrics` 门面记录，安装Prometheus导出器后可被抓取。
//! 与持久化的按队列聚合指标（`queue_metrics` 表）相互独立。

use std::net::SocketAddr;

use anyhow::{Context, Result};
use jobqueue_domain::{JobStatus, JobType, QueueDepth, ReapAction};
use metrics::{counter, gauge, histogram, Counter, Histogram};
use tracing::info;

pub struct MetricsCollector {
    jobs_enqueued_total: Counter,
    jobs_claimed_total: Counter,
    claim_empty_polls_total: Counter,
    reap_runs_total: Counter,
    claim_duration: Histogram,
    reap_duration: Histogram,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            jobs_enqueued_total: counter!("jobqueue_jobs_enqueued_total"),
            jobs_claimed_total: counter!("jobqueue_jobs_claimed_total"),
            claim_empty_polls_total: counter!("jobqueue_claim_empty_polls_total"),
            reap_runs_total: counter!("jobqueue_reap_runs_total"),
            claim_duration: histogram!("jobqueue_claim_duration_seconds"),
            reap_duration: histogram!("jobqueue_reap_duration_seconds"),
        }
    }

    pub fn record_enqueued(&self, job_type: JobType) {
        self.jobs_enqueued_total.increment(1);
        counter!("jobqueue_jobs_enqueued_by_type_total", "job_type" => job_type.as_str())
            .increment(1);
    }

    pub fn record_claim(&self, claimed: bool, duration_seconds: f64) {
        self.claim_duration.record(duration_seconds);
        if claimed {
            self.jobs_claimed_total.increment(1);
        } else {
            self.claim_empty_polls_total.increment(1);
        }
    }

    pub fn record_report(&self, status: JobStatus, found: bool) {
        counter!(
            "jobqueue_job_reports_total",
            "status" => status.as_str(),
            "found" => if found { "true" } else { "false" }
        )
        .increment(1);
    }

    pub fn record_reap(&self, actions: &[ReapAction], duration_seconds: f64) {
        self.reap_runs_total.increment(1);
        self.reap_duration.record(duration_seconds);
        for action in actions {
            counter!("jobqueue_jobs_reaped_total", "action" => action.as_str()).increment(1);
        }
    }

    pub fn update_queue_depth(&self, depths: &[QueueDepth]) {
        for depth in depths {
            gauge!(
                "jobqueue_queue_depth",
                "job_type" => depth.job_type.as_str(),
                "status" => depth.status.as_str()
            )
            .set(depth.count as f64);
        }
    }
}

/// 在给定地址上启动Prometheus抓取端点
pub fn init_metrics(listen_address: &str) -> Result<()> {
    let address: SocketAddr = listen_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {listen_address}"))?;

    let (recorder, exporter) = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(address)
        .build()
        .map_err(|e| anyhow::anyhow!("创建Prometheus导出器失败: {}", e))?;

    metrics::set_global_recorder(recorder)
        .map_err(|e| anyhow::anyhow!("安装指标记录器失败: {}", e))?;
    tokio::spawn(exporter);

    info!("Prometheus指标端点已启动: {}", address);
    Ok(())
}
