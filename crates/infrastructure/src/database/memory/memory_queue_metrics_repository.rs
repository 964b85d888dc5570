use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobqueue_domain::{repositories::QueueMetricsRepository, worker::QueueMetrics};
use jobqueue_errors::QueueResult;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryQueueMetricsRepository {
    metrics: Mutex<HashMap<String, QueueMetrics>>,
}

impl MemoryQueueMetricsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueMetricsRepository for MemoryQueueMetricsRepository {
    async fn record_completion(
        &self,
        queue_name: &str,
        latency_ms: f64,
        success: bool,
        now: DateTime<Utc>,
    ) -> QueueResult<QueueMetrics> {
        let mut metrics = self.metrics.lock().await;
        let entry = metrics
            .entry(queue_name.to_string())
            .and_modify(|existing| existing.apply_sample(latency_ms, success, now))
            .or_insert_with(|| QueueMetrics::first_sample(queue_name, latency_ms, success, now));
        Ok(entry.clone())
    }

    async fn find_by_queue(&self, queue_name: &str) -> QueueResult<Option<QueueMetrics>> {
        Ok(self.metrics.lock().await.get(queue_name).cloned())
    }
}
