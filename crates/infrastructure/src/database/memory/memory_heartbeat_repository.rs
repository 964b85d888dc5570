use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobqueue_domain::{repositories::HeartbeatRepository, worker::WorkerHeartbeat};
use jobqueue_errors::QueueResult;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryHeartbeatRepository {
    heartbeats: Mutex<HashMap<String, WorkerHeartbeat>>,
}

impl MemoryHeartbeatRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HeartbeatRepository for MemoryHeartbeatRepository {
    async fn upsert(&self, heartbeat: &WorkerHeartbeat) -> QueueResult<()> {
        self.heartbeats
            .lock()
            .await
            .insert(heartbeat.worker_id.clone(), heartbeat.clone());
        Ok(())
    }

    async fn find_by_id(&self, worker_id: &str) -> QueueResult<Option<WorkerHeartbeat>> {
        Ok(self.heartbeats.lock().await.get(worker_id).cloned())
    }

    async fn find_all(&self) -> QueueResult<Vec<WorkerHeartbeat>> {
        let mut all: Vec<WorkerHeartbeat> =
            self.heartbeats.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        Ok(all)
    }

    async fn find_stale(&self, cutoff: DateTime<Utc>) -> QueueResult<Vec<WorkerHeartbeat>> {
        let mut stale: Vec<WorkerHeartbeat> = self
            .heartbeats
            .lock()
            .await
            .values()
            .filter(|heartbeat| heartbeat.last_seen_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|heartbeat| heartbeat.last_seen_at);
        Ok(stale)
    }
}
