use std::sync::Arc;

use chrono::Duration;
use jobqueue_config::ReaperConfig;
use jobqueue_dispatcher::{JobQueue, QueueSettings, ReaperService};
use jobqueue_domain::{JobStatus, JobType, NewJob, ReapAction};
use jobqueue_infrastructure::Repositories;
use jobqueue_testing_utils::ManualClock;
use tokio::sync::broadcast;

async fn queue_with_stuck_jobs(count: usize, batch_size: i64) -> (Arc<JobQueue>, ManualClock) {
    let clock = ManualClock::fixed();
    let queue = Arc::new(JobQueue::new(
        Repositories::in_memory(),
        Arc::new(clock.clone()),
        QueueSettings::default().with_reap_batch_size(batch_size),
    ));
    for _ in 0..count {
        queue
            .enqueue(NewJob::new(JobType::Enrich, serde_json::json!({})))
            .await
            .unwrap();
        queue
            .claim(&[JobType::Enrich], 30, "crashed-worker")
            .await
            .unwrap()
            .unwrap();
    }
    clock.advance(Duration::minutes(40));
    (queue, clock)
}

#[tokio::test]
async fn test_run_once_drains_backlog_in_batches() {
    let (queue, _clock) = queue_with_stuck_jobs(5, 2).await;
    let reaper = ReaperService::new(Arc::clone(&queue), &ReaperConfig::default());

    let reaped = reaper.run_once().await.unwrap();
    assert_eq!(reaped.len(), 5);
    assert!(reaped
        .iter()
        .all(|r| r.action == ReapAction::ResetWithBackoff));

    let depths = queue.queue_depth().await.unwrap();
    assert!(depths
        .iter()
        .all(|d| d.status != JobStatus::Processing || d.count == 0));

    assert!(reaper.run_once().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_once_honours_lease_timeout() {
    let (queue, _clock) = queue_with_stuck_jobs(1, 100).await;
    let config = ReaperConfig {
        lease_timeout_minutes: 60,
        ..ReaperConfig::default()
    };
    let reaper = ReaperService::new(queue, &config);
    assert!(reaper.run_once().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let (queue, _clock) = queue_with_stuck_jobs(1, 100).await;
    let config = ReaperConfig {
        interval_seconds: 1,
        ..ReaperConfig::default()
    };
    let reaper = ReaperService::new(Arc::clone(&queue), &config);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = tokio::spawn(async move { reaper.run(shutdown_rx).await });
    // 第一次tick立即触发
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    shutdown_tx.send(()).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let depths = queue.queue_depth().await.unwrap();
    let pending: i64 = depths
        .iter()
        .filter(|d| d.status == JobStatus::Pending)
        .map(|d| d.count)
        .sum();
    assert_eq!(pending, 1);
}
