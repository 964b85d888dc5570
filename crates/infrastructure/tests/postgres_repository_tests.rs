//! 需要本机Docker：`cargo test -p jobqueue-infrastructure -- --ignored`

mod common;

use std::sync::Arc;

use jobqueue_domain::JobRepository;
use jobqueue_infrastructure::{
    PostgresHeartbeatRepository, PostgresJobRepository, PostgresQueueMetricsRepository,
};
use jobqueue_testing_utils::PostgresTestContainer;

#[tokio::test]
#[ignore]
async fn test_postgres_job_repository() {
    let container = PostgresTestContainer::new().await.unwrap();
    let repo = PostgresJobRepository::new(container.pool.clone());

    common::claim_orders_by_due_time_then_created_at(&repo).await;
    container.clean_tables().await.unwrap();
    common::claim_priority_first_ordering(&repo).await;
    container.clean_tables().await.unwrap();
    common::claim_acquires_lease(&repo).await;
    container.clean_tables().await.unwrap();
    common::claim_respects_type_filter_and_due_time(&repo).await;
    container.clean_tables().await.unwrap();
    common::claim_treats_null_next_run_at_as_now(&repo).await;
    container.clean_tables().await.unwrap();
    common::terminal_report_clears_lease(&repo).await;
    container.clean_tables().await.unwrap();
    common::report_keeps_previous_error_and_lease_on_processing(&repo).await;
    container.clean_tables().await.unwrap();
    common::report_unknown_job_is_not_found(&repo).await;
    container.clean_tables().await.unwrap();
    common::reap_resets_with_backoff(&repo).await;
    container.clean_tables().await.unwrap();
    common::reap_moves_exhausted_job_to_dead_letter(&repo).await;
    container.clean_tables().await.unwrap();
    common::reap_respects_batch_limit(&repo).await;
    container.clean_tables().await.unwrap();
    common::late_report_after_reap_is_ignored(&repo).await;
    container.clean_tables().await.unwrap();
    common::counts_by_type_and_status(&repo).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_postgres_concurrent_claims_are_exclusive() {
    let container = PostgresTestContainer::new().await.unwrap();
    let repo: Arc<dyn JobRepository> = Arc::new(PostgresJobRepository::new(container.pool.clone()));
    common::concurrent_claims_are_exclusive(repo).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_postgres_concurrent_reaps_never_double_process() {
    let container = PostgresTestContainer::new().await.unwrap();
    let repo: Arc<dyn JobRepository> = Arc::new(PostgresJobRepository::new(container.pool.clone()));
    common::concurrent_reaps_never_double_process(repo).await;
}

#[tokio::test]
#[ignore]
async fn test_postgres_heartbeats_and_metrics() {
    let container = PostgresTestContainer::new().await.unwrap();

    common::heartbeat_last_write_wins(&PostgresHeartbeatRepository::new(container.pool.clone()))
        .await;
    container.clean_tables().await.unwrap();
    common::heartbeat_find_stale(&PostgresHeartbeatRepository::new(container.pool.clone())).await;
    common::queue_metrics_moving_average(&PostgresQueueMetricsRepository::new(
        container.pool.clone(),
    ))
    .await;
}
