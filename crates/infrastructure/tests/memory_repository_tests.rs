mod common;

use std::sync::Arc;

use jobqueue_domain::JobRepository;
use jobqueue_infrastructure::{
    MemoryHeartbeatRepository, MemoryJobRepository, MemoryQueueMetricsRepository, Repositories,
};

#[tokio::test]
async fn test_memory_claim_ordering() {
    common::claim_orders_by_due_time_then_created_at(&MemoryJobRepository::new()).await;
}

#[tokio::test]
async fn test_memory_claim_priority_first() {
    common::claim_priority_first_ordering(&MemoryJobRepository::new()).await;
}

#[tokio::test]
async fn test_memory_claim_acquires_lease() {
    common::claim_acquires_lease(&MemoryJobRepository::new()).await;
}

#[tokio::test]
async fn test_memory_claim_filters() {
    common::claim_respects_type_filter_and_due_time(&MemoryJobRepository::new()).await;
}

#[tokio::test]
async fn test_memory_claim_null_next_run_at() {
    common::claim_treats_null_next_run_at_as_now(&MemoryJobRepository::new()).await;
}

#[tokio::test]
async fn test_memory_terminal_report_clears_lease() {
    common::terminal_report_clears_lease(&MemoryJobRepository::new()).await;
}

#[tokio::test]
async fn test_memory_processing_report() {
    common::report_keeps_previous_error_and_lease_on_processing(&MemoryJobRepository::new())
        .await;
}

#[tokio::test]
async fn test_memory_report_not_found() {
    common::report_unknown_job_is_not_found(&MemoryJobRepository::new()).await;
}

#[tokio::test]
async fn test_memory_reap_reset() {
    common::reap_resets_with_backoff(&MemoryJobRepository::new()).await;
}

#[tokio::test]
async fn test_memory_reap_dead_letter() {
    common::reap_moves_exhausted_job_to_dead_letter(&MemoryJobRepository::new()).await;
}

#[tokio::test]
async fn test_memory_reap_batch_limit() {
    common::reap_respects_batch_limit(&MemoryJobRepository::new()).await;
}

#[tokio::test]
async fn test_memory_count_by_status() {
    common::counts_by_type_and_status(&MemoryJobRepository::new()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_claims() {
    let repo: Arc<dyn JobRepository> = Arc::new(MemoryJobRepository::new());
    common::concurrent_claims_are_exclusive(repo).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_reaps() {
    let repo: Arc<dyn JobRepository> = Arc::new(MemoryJobRepository::new());
    common::concurrent_reaps_never_double_process(repo).await;
}

#[tokio::test]
async fn test_memory_late_report_after_reap() {
    common::late_report_after_reap_is_ignored(&MemoryJobRepository::new()).await;
}

#[tokio::test]
async fn test_memory_heartbeats() {
    common::heartbeat_last_write_wins(&MemoryHeartbeatRepository::new()).await;
    common::heartbeat_find_stale(&MemoryHeartbeatRepository::new()).await;
}

#[tokio::test]
async fn test_memory_queue_metrics() {
    common::queue_metrics_moving_average(&MemoryQueueMetricsRepository::new()).await;
}

#[tokio::test]
async fn test_in_memory_repositories_share_state_across_clones() {
    let repos = Repositories::in_memory();
    let clone = repos.clone();
    let job = jobqueue_testing_utils::JobBuilder::new()
        .created_at(common::t0())
        .build();
    repos.jobs.insert(&job).await.unwrap();
    assert!(clone.jobs.get_by_id(job.id).await.unwrap().is_some());
}
