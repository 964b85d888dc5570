//! 三种存储后端共用的行为检查。每个后端的测试文件构造仓储后调用这里的函数。

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jobqueue_domain::{
    ClaimOrdering, ClaimRequest, HeartbeatRepository, JobRepository, JobStatus, JobType,
    QueueMetricsRepository, ReapAction, ReportStatus, StatusReport, WorkerStatus,
    DEFAULT_MAX_ERROR_LENGTH,
};
use jobqueue_testing_utils::{HeartbeatBuilder, JobBuilder};
use uuid::Uuid;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

pub fn claim_request(job_types: &[JobType], worker_id: &str) -> ClaimRequest {
    ClaimRequest {
        job_types: job_types.to_vec(),
        lease_timeout: Duration::minutes(30),
        worker_id: worker_id.to_string(),
        ordering: ClaimOrdering::DueTime,
    }
}

fn report(job_id: Uuid, status: ReportStatus) -> StatusReport {
    StatusReport {
        job_id,
        status,
        error_message: None,
        next_run_at: None,
    }
}

pub async fn claim_orders_by_due_time_then_created_at(repo: &dyn JobRepository) {
    let a = JobBuilder::new().created_at(t0()).with_priority(0).build();
    let b = JobBuilder::new()
        .created_at(t0() + Duration::seconds(1))
        .next_run_at(Some(t0()))
        .with_priority(9)
        .build();
    // 先插入B，排序不能依赖插入顺序
    repo.insert(&b).await.unwrap();
    repo.insert(&a).await.unwrap();

    let request = claim_request(&[JobType::Enrich], "w1");
    let now = t0() + Duration::seconds(5);
    let first = repo.claim_next(&request, now).await.unwrap().unwrap();
    let second = repo.claim_next(&request, now).await.unwrap().unwrap();
    assert_eq!(first.id, a.id);
    assert_eq!(second.id, b.id);
    assert!(repo.claim_next(&request, now).await.unwrap().is_none());
}

pub async fn claim_priority_first_ordering(repo: &dyn JobRepository) {
    let low = JobBuilder::new().created_at(t0()).with_priority(0).build();
    let high = JobBuilder::new()
        .created_at(t0() + Duration::seconds(1))
        .with_priority(5)
        .build();
    repo.insert(&low).await.unwrap();
    repo.insert(&high).await.unwrap();

    let mut request = claim_request(&[JobType::Enrich], "w1");
    request.ordering = ClaimOrdering::PriorityFirst;
    let claimed = repo
        .claim_next(&request, t0() + Duration::seconds(5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, high.id);
}

pub async fn claim_acquires_lease(repo: &dyn JobRepository) {
    let job = JobBuilder::new()
        .with_job_type(JobType::Enrich)
        .with_priority(5)
        .with_payload(serde_json::json!({"account": 42}))
        .created_at(t0())
        .build();
    repo.insert(&job).await.unwrap();

    let now = t0() + Duration::seconds(1);
    let claimed = repo
        .claim_next(&claim_request(&[JobType::Enrich], "w1"), now)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(claimed.id, job.id);
    assert_eq!(claimed.status, JobStatus::Processing);
    assert_eq!(claimed.attempts, 1);
    assert_eq!(claimed.worker_id.as_deref(), Some("w1"));
    assert_eq!(claimed.started_at, Some(now));
    assert_eq!(claimed.locked_at, Some(now));
    assert_eq!(claimed.payload, serde_json::json!({"account": 42}));
    assert_eq!(claimed.created_at, t0());
    assert!(claimed.is_leased());

    let stored = repo.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored, claimed);
}

pub async fn claim_respects_type_filter_and_due_time(repo: &dyn JobRepository) {
    let email = JobBuilder::new()
        .with_job_type(JobType::SendEmail)
        .created_at(t0())
        .build();
    let later = JobBuilder::new()
        .with_job_type(JobType::Webhook)
        .created_at(t0())
        .next_run_at(Some(t0() + Duration::minutes(10)))
        .build();
    repo.insert(&email).await.unwrap();
    repo.insert(&later).await.unwrap();

    let now = t0() + Duration::seconds(1);
    assert!(repo
        .claim_next(&claim_request(&[JobType::Enrich], "w1"), now)
        .await
        .unwrap()
        .is_none());
    assert!(repo
        .claim_next(&claim_request(&[JobType::Webhook], "w1"), now)
        .await
        .unwrap()
        .is_none());

    let claimed = repo
        .claim_next(
            &claim_request(&[JobType::Webhook], "w1"),
            t0() + Duration::minutes(10),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, later.id);

    let claimed = repo
        .claim_next(
            &claim_request(&[JobType::Enrich, JobType::SendEmail], "w2"),
            now,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, email.id);
}

pub async fn claim_treats_null_next_run_at_as_now(repo: &dyn JobRepository) {
    let job = JobBuilder::new().created_at(t0()).next_run_at(None).build();
    repo.insert(&job).await.unwrap();

    let claimed = repo
        .claim_next(&claim_request(&[JobType::Enrich], "w1"), t0())
        .await
        .unwrap();
    assert_eq!(claimed.map(|j| j.id), Some(job.id));
}

pub async fn terminal_report_clears_lease(repo: &dyn JobRepository) {
    let job = JobBuilder::new().created_at(t0()).build();
    repo.insert(&job).await.unwrap();
    let now = t0() + Duration::seconds(1);
    repo.claim_next(&claim_request(&[JobType::Enrich], "w1"), now)
        .await
        .unwrap()
        .unwrap();

    let mut failed = report(job.id, ReportStatus::Failed);
    failed.error_message = Some("timeout".to_string());
    failed.next_run_at = Some(now + Duration::seconds(60));
    assert!(repo.report_status(&failed, now).await.unwrap());

    let stored = repo.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.last_error.as_deref(), Some("timeout"));
    assert_eq!(stored.next_run_at, Some(now + Duration::seconds(60)));
    assert_eq!(stored.worker_id, None);
    assert_eq!(stored.locked_at, None);
    assert_eq!(stored.started_at, None);
    assert_eq!(stored.attempts, 1);

    // failed是终态，不会再被认领
    assert!(repo
        .claim_next(
            &claim_request(&[JobType::Enrich], "w2"),
            now + Duration::minutes(5)
        )
        .await
        .unwrap()
        .is_none());
}

pub async fn report_keeps_previous_error_and_lease_on_processing(repo: &dyn JobRepository) {
    let job = JobBuilder::new().created_at(t0()).build();
    repo.insert(&job).await.unwrap();
    let now = t0() + Duration::seconds(1);
    repo.claim_next(&claim_request(&[JobType::Enrich], "w1"), now)
        .await
        .unwrap()
        .unwrap();

    let mut ping = report(job.id, ReportStatus::Processing);
    ping.error_message = Some("partial failure".to_string());
    assert!(repo.report_status(&ping, now).await.unwrap());

    let ping = report(job.id, ReportStatus::Processing);
    assert!(repo.report_status(&ping, now).await.unwrap());

    let stored = repo.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert_eq!(stored.last_error.as_deref(), Some("partial failure"));
    assert_eq!(stored.worker_id.as_deref(), Some("w1"));
    assert_eq!(stored.started_at, Some(now));

    let completed = report(job.id, ReportStatus::Completed);
    assert!(repo.report_status(&completed, now).await.unwrap());
    let stored = repo.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.last_error.as_deref(), Some("partial failure"));
    assert!(!stored.is_leased());
}

pub async fn report_unknown_job_is_not_found(repo: &dyn JobRepository) {
    let found = repo
        .report_status(&report(Uuid::new_v4(), ReportStatus::Completed), t0())
        .await
        .unwrap();
    assert!(!found);
}

pub async fn reap_resets_with_backoff(repo: &dyn JobRepository) {
    let job = JobBuilder::new().created_at(t0()).build();
    repo.insert(&job).await.unwrap();
    repo.claim_next(&claim_request(&[JobType::Enrich], "w2"), t0())
        .await
        .unwrap()
        .unwrap();

    // 租约未过期时不回收
    let now = t0() + Duration::minutes(10);
    let reaped = repo
        .reap_expired(now - Duration::minutes(30), now, 100, DEFAULT_MAX_ERROR_LENGTH)
        .await
        .unwrap();
    assert!(reaped.is_empty());

    let now = t0() + Duration::minutes(31);
    let reaped = repo
        .reap_expired(now - Duration::minutes(30), now, 100, DEFAULT_MAX_ERROR_LENGTH)
        .await
        .unwrap();
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].job_id, job.id);
    assert_eq!(reaped[0].action, ReapAction::ResetWithBackoff);
    assert_eq!(reaped[0].attempts, 1);
    assert_eq!(reaped[0].max_attempts, 5);

    let stored = repo.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.next_run_at, Some(now + Duration::seconds(60)));
    assert_eq!(stored.reap_count, 1);
    assert_eq!(stored.attempts, 1);
    assert!(stored.worker_id.is_none() && stored.started_at.is_none() && stored.locked_at.is_none());
    assert!(stored.last_error.unwrap_or_default().contains("w2"));

    // 退避期内不可认领，之后可以，且attempts继续递增
    let request = claim_request(&[JobType::Enrich], "w3");
    assert!(repo
        .claim_next(&request, now + Duration::seconds(59))
        .await
        .unwrap()
        .is_none());
    let reclaimed = repo
        .claim_next(&request, now + Duration::seconds(60))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(reclaimed.attempts, 2);
    assert_eq!(reclaimed.worker_id.as_deref(), Some("w3"));
}

pub async fn reap_moves_exhausted_job_to_dead_letter(repo: &dyn JobRepository) {
    let job = JobBuilder::new()
        .created_at(t0())
        .with_max_attempts(1)
        .build();
    repo.insert(&job).await.unwrap();
    repo.claim_next(&claim_request(&[JobType::Enrich], "w2"), t0())
        .await
        .unwrap()
        .unwrap();

    let now = t0() + Duration::minutes(45);
    let reaped = repo
        .reap_expired(now - Duration::minutes(30), now, 100, DEFAULT_MAX_ERROR_LENGTH)
        .await
        .unwrap();
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].action, ReapAction::MovedToDlq);
    assert_eq!(reaped[0].attempts, 1);
    assert_eq!(reaped[0].max_attempts, 1);

    let stored = repo.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.reap_count, 1);
    assert_eq!(stored.next_run_at, Some(t0()));
    assert!(!stored.is_leased());
    assert!(stored.last_error.unwrap_or_default().contains("1/1"));

    let dead = repo.list_dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, job.id);

    // 死信不会再被认领，也不会再被回收
    assert!(repo
        .claim_next(
            &claim_request(&[JobType::Enrich], "w3"),
            now + Duration::hours(2)
        )
        .await
        .unwrap()
        .is_none());
    let later = now + Duration::hours(2);
    assert!(repo
        .reap_expired(later - Duration::minutes(30), later, 100, DEFAULT_MAX_ERROR_LENGTH)
        .await
        .unwrap()
        .is_empty());
}

pub async fn reap_respects_batch_limit(repo: &dyn JobRepository) {
    for i in 0..3 {
        let job = JobBuilder::new()
            .created_at(t0() + Duration::seconds(i))
            .build();
        repo.insert(&job).await.unwrap();
        repo.claim_next(
            &claim_request(&[JobType::Enrich], "w1"),
            t0() + Duration::seconds(i),
        )
        .await
        .unwrap()
        .unwrap();
    }

    let now = t0() + Duration::hours(1);
    let cutoff = now - Duration::minutes(30);
    let first = repo
        .reap_expired(cutoff, now, 2, DEFAULT_MAX_ERROR_LENGTH)
        .await
        .unwrap();
    assert_eq!(first.len(), 2);
    let second = repo
        .reap_expired(cutoff, now, 2, DEFAULT_MAX_ERROR_LENGTH)
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert!(first.iter().all(|r| r.job_id != second[0].job_id));
}

pub async fn counts_by_type_and_status(repo: &dyn JobRepository) {
    for job_type in [JobType::Enrich, JobType::Enrich, JobType::Export] {
        let job = JobBuilder::new()
            .with_job_type(job_type)
            .created_at(t0())
            .build();
        repo.insert(&job).await.unwrap();
    }
    repo.claim_next(&claim_request(&[JobType::Export], "w1"), t0())
        .await
        .unwrap()
        .unwrap();

    let depths = repo.count_by_status().await.unwrap();
    let count = |job_type: JobType, status: JobStatus| {
        depths
            .iter()
            .find(|d| d.job_type == job_type && d.status == status)
            .map(|d| d.count)
            .unwrap_or(0)
    };
    assert_eq!(count(JobType::Enrich, JobStatus::Pending), 2);
    assert_eq!(count(JobType::Export, JobStatus::Processing), 1);
    assert_eq!(count(JobType::Export, JobStatus::Pending), 0);
}

pub async fn concurrent_claims_are_exclusive(repo: Arc<dyn JobRepository>) {
    let job = JobBuilder::new().created_at(t0()).build();
    repo.insert(&job).await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move {
                repo.claim_next(
                    &claim_request(&[JobType::Enrich], &format!("w{i}")),
                    t0() + Duration::seconds(1),
                )
                .await
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let claimed: Vec<_> = results
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .filter_map(|job| job)
        .collect();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, job.id);
    assert_eq!(claimed[0].attempts, 1);
}

pub async fn concurrent_reaps_never_double_process(repo: Arc<dyn JobRepository>) {
    let mut ids = Vec::new();
    for i in 0..6 {
        let job = JobBuilder::new()
            .created_at(t0() + Duration::seconds(i))
            .build();
        repo.insert(&job).await.unwrap();
        ids.push(job.id);
    }
    for _ in 0..6 {
        repo.claim_next(&claim_request(&[JobType::Enrich], "w1"), t0() + Duration::seconds(10))
            .await
            .unwrap()
            .unwrap();
    }

    let now = t0() + Duration::minutes(45);
    let cutoff = now - Duration::minutes(30);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move {
                repo.reap_expired(cutoff, now, 100, DEFAULT_MAX_ERROR_LENGTH)
                    .await
            })
        })
        .collect();

    let mut reaped: Vec<Uuid> = futures::future::join_all(handles)
        .await
        .into_iter()
        .flat_map(|r| r.unwrap().unwrap())
        .map(|job| job.job_id)
        .collect();
    reaped.sort();
    ids.sort();
    assert_eq!(reaped, ids);

    for id in ids {
        let stored = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.reap_count, 1);
        assert_eq!(stored.attempts, 1);
        assert!(!stored.is_leased());
    }
}

pub async fn late_report_after_reap_is_ignored(repo: &dyn JobRepository) {
    let job = JobBuilder::new().created_at(t0()).build();
    repo.insert(&job).await.unwrap();
    repo.claim_next(&claim_request(&[JobType::Enrich], "w1"), t0())
        .await
        .unwrap()
        .unwrap();

    let now = t0() + Duration::minutes(31);
    let reaped = repo
        .reap_expired(now - Duration::minutes(30), now, 100, DEFAULT_MAX_ERROR_LENGTH)
        .await
        .unwrap();
    assert_eq!(reaped.len(), 1);

    let mut ping = report(job.id, ReportStatus::Processing);
    ping.error_message = Some("still working".to_string());
    assert!(!repo.report_status(&ping, now).await.unwrap());
    assert!(!repo
        .report_status(&report(job.id, ReportStatus::Completed), now)
        .await
        .unwrap());

    let stored = repo.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_ne!(stored.last_error.as_deref(), Some("still working"));

    // 退避结束后仍能被重新认领
    let later = now + Duration::hours(10);
    let reclaimed = repo
        .claim_next(&claim_request(&[JobType::Enrich], "w2"), later)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(reclaimed.attempts, 2);

    // 终态之后的上报同样不生效
    assert!(repo
        .report_status(&report(job.id, ReportStatus::Completed), later)
        .await
        .unwrap());
    assert!(!repo
        .report_status(&report(job.id, ReportStatus::Processing), later)
        .await
        .unwrap());
    assert_eq!(
        repo.get_by_id(job.id).await.unwrap().unwrap().status,
        JobStatus::Completed
    );
}

pub async fn heartbeat_last_write_wins(repo: &dyn HeartbeatRepository) {
    let first = HeartbeatBuilder::new("w1")
        .with_status(WorkerStatus::Starting)
        .last_seen_at(t0())
        .build();
    repo.upsert(&first).await.unwrap();

    let second = HeartbeatBuilder::new("w1")
        .with_queue_name("emails")
        .with_status(WorkerStatus::Healthy)
        .with_counts(10, 2)
        .last_seen_at(t0() + Duration::seconds(30))
        .build();
    repo.upsert(&second).await.unwrap();

    let stored = repo.find_by_id("w1").await.unwrap().unwrap();
    assert_eq!(stored, second);
    assert_eq!(repo.find_all().await.unwrap().len(), 1);
    assert!(repo.find_by_id("missing").await.unwrap().is_none());
}

pub async fn heartbeat_find_stale(repo: &dyn HeartbeatRepository) {
    let now = t0() + Duration::minutes(10);
    for (worker_id, minutes_ago) in [("fresh", 1), ("old", 9), ("older", 6)] {
        let heartbeat = HeartbeatBuilder::new(worker_id)
            .last_seen_at(now - Duration::minutes(minutes_ago))
            .build();
        repo.upsert(&heartbeat).await.unwrap();
    }

    let stale = repo
        .find_stale(now - Duration::minutes(5))
        .await
        .unwrap();
    let ids: Vec<_> = stale.iter().map(|h| h.worker_id.as_str()).collect();
    assert_eq!(ids, vec!["old", "older"]);
}

pub async fn queue_metrics_moving_average(repo: &dyn QueueMetricsRepository) {
    assert!(repo.find_by_queue("default").await.unwrap().is_none());

    let first = repo
        .record_completion("default", 100.0, true, t0())
        .await
        .unwrap();
    assert_eq!(first.processed_count, 1);
    assert_eq!(first.avg_latency_ms, 100.0);
    assert_eq!(first.last_success_at, Some(t0()));

    let later = t0() + Duration::seconds(5);
    let second = repo
        .record_completion("default", 200.0, false, later)
        .await
        .unwrap();
    assert_eq!(second.processed_count, 1);
    assert_eq!(second.failed_count, 1);
    assert!((second.avg_latency_ms - 110.0).abs() < 1e-9);
    assert_eq!(second.min_latency_ms, 100.0);
    assert_eq!(second.max_latency_ms, 200.0);
    assert_eq!(second.last_success_at, Some(t0()));
    assert_eq!(second.updated_at, later);

    let stored = repo.find_by_queue("default").await.unwrap().unwrap();
    assert_eq!(stored, second);
}
