//! Integration tests for FIFO ordering and the single-worker lifecycle.

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Result;
use conveyor_core::{CallbackStatus, Clock, JobStatus, SystemClock};
use conveyor_delivery::{engine::DeliveryConfig, DeliveryEngine};
use conveyor_queue::{Admission, Scheduler, SubmitOutcome};
use conveyor_report::{GeneratorConfig, ReportGenerator};
use conveyor_testing::{wait_until, TestEnv};
use serde_json::{json, Value as JsonValue};
use wiremock::{
    matchers::{method, path},
    Mock, ResponseTemplate,
};

struct Stack {
    env: TestEnv,
    scheduler: Arc<Scheduler>,
    admission: Arc<Admission>,
}

async fn stack() -> Result<Stack> {
    let env = TestEnv::new().await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let generator = Arc::new(ReportGenerator::new(GeneratorConfig {
        reports_dir: env.reports_dir.clone(),
        transaction_cost: Duration::ZERO,
        max_transactions: 1_000,
    }));
    let engine = Arc::new(DeliveryEngine::new(
        env.storage(),
        DeliveryConfig::default(),
        clock.clone(),
    )?);
    let scheduler =
        Arc::new(Scheduler::new(env.storage(), generator.clone(), engine, clock.clone()));
    let admission = Arc::new(Admission::new(env.storage(), scheduler.clone(), generator, clock));

    Ok(Stack { env, scheduler, admission })
}

async fn wait_for_status(stack: &Stack, job_id: conveyor_core::JobId, status: JobStatus) -> Result<()> {
    let storage = stack.env.storage();
    wait_until(&format!("job {job_id} reaches {status}"), Duration::from_secs(10), || {
        let storage = storage.clone();
        async move {
            Ok(storage.jobs.find(job_id).await?.map(|job| job.status) == Some(status))
        }
    })
    .await
}

#[tokio::test]
async fn concurrent_admissions_get_dense_positions_and_deliver_in_order() -> Result<()> {
    let stack = stack().await?;
    const N: usize = 10;

    Mock::given(method("POST"))
        .and(path("/cb"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&stack.env.http_mock)
        .await;
    let callback_url = stack.env.mock_url("/cb");

    let mut handles = Vec::new();
    for i in 0..N {
        let admission = stack.admission.clone();
        let callback_url = callback_url.clone();
        handles.push(tokio::spawn(async move {
            admission
                .submit(
                    json!({"report_name": format!("Job{i}"), "num_transactions": 1}),
                    &callback_url,
                    None,
                )
                .await
        }));
    }

    let mut position_by_job = HashMap::new();
    for handle in handles {
        match handle.await?? {
            SubmitOutcome::Accepted { job_id, queue_position } => {
                position_by_job.insert(job_id.to_string(), queue_position);
            },
            SubmitOutcome::Duplicate { .. } => unreachable!("no idempotency keys were supplied"),
        }
    }

    // Positions are exactly {1..N}: no duplicates, no gaps.
    let mut positions: Vec<i64> = position_by_job.values().copied().collect();
    positions.sort_unstable();
    assert_eq!(positions, (1..=N as i64).collect::<Vec<_>>());

    let storage = stack.env.storage();
    wait_until("all jobs completed", Duration::from_secs(10), || {
        let storage = storage.clone();
        async move {
            let jobs = storage.jobs.list(None).await?;
            Ok(jobs.len() == N && jobs.iter().all(|j| j.status == JobStatus::Completed))
        }
    })
    .await?;

    // Webhooks arrived in queue-position order: dequeue order equals
    // admission order.
    let requests = stack.env.http_mock.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), N);

    let delivered_positions: Vec<i64> = requests
        .iter()
        .map(|request| {
            let body: JsonValue = serde_json::from_slice(&request.body).expect("json body");
            let request_id = body["request_id"].as_str().expect("request_id").to_string();
            position_by_job[&request_id]
        })
        .collect();

    assert_eq!(delivered_positions, (1..=N as i64).collect::<Vec<_>>());

    Ok(())
}

#[tokio::test]
async fn completion_order_matches_admission_order() -> Result<()> {
    let stack = stack().await?;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&stack.env.http_mock)
        .await;
    let callback_url = stack.env.mock_url("/cb");

    let mut ids = Vec::new();
    for name in ["A", "B", "C"] {
        let outcome = stack
            .admission
            .submit(json!({"report_name": name, "num_transactions": 2}), &callback_url, None)
            .await?;
        let SubmitOutcome::Accepted { job_id, .. } = outcome else {
            unreachable!("fresh submissions are accepted");
        };
        ids.push(job_id);
    }

    for id in &ids {
        wait_for_status(&stack, *id, JobStatus::Completed).await?;
    }

    let storage = stack.env.storage();
    let mut completed = Vec::new();
    for id in &ids {
        let job = storage.jobs.find(*id).await?.expect("job exists");
        completed.push(job.completed_at.expect("completed_at set"));
    }

    assert!(completed[0] <= completed[1]);
    assert!(completed[1] <= completed[2]);

    Ok(())
}

#[tokio::test]
async fn generator_fault_fails_one_job_without_stalling_the_queue() -> Result<()> {
    let stack = stack().await?;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&stack.env.http_mock)
        .await;
    let callback_url = stack.env.mock_url("/cb");

    let SubmitOutcome::Accepted { job_id: bad, .. } = stack
        .admission
        .submit(json!({"num_transactions": "lots"}), &callback_url, None)
        .await?
    else {
        unreachable!("fresh submissions are accepted");
    };
    let SubmitOutcome::Accepted { job_id: good, .. } = stack
        .admission
        .submit(json!({"report_name": "After", "num_transactions": 1}), &callback_url, None)
        .await?
    else {
        unreachable!("fresh submissions are accepted");
    };

    // The bad job fails, the one queued behind it still completes.
    wait_for_status(&stack, good, JobStatus::Completed).await?;

    let storage = stack.env.storage();
    let failed = storage.jobs.find(bad).await?.expect("job exists");
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.result().unwrap()["error"].as_str().unwrap().contains("num_transactions"));

    // Failed jobs skip delivery entirely: the outcome is never resolved and
    // no attempt is logged.
    assert_eq!(failed.callback_status, Some(CallbackStatus::Pending));
    assert_eq!(storage.attempts.count_by_job(bad).await?, 0);

    Ok(())
}

#[tokio::test]
async fn blocked_callback_url_skips_delivery_entirely() -> Result<()> {
    let stack = stack().await?;

    let SubmitOutcome::Accepted { job_id, .. } = stack
        .admission
        .submit(json!({"report_name": "Private", "num_transactions": 1}), "http://10.0.0.5/x", None)
        .await?
    else {
        unreachable!("fresh submissions are accepted");
    };

    wait_for_status(&stack, job_id, JobStatus::Completed).await?;

    let storage = stack.env.storage();
    wait_until("callback outcome resolved", Duration::from_secs(5), || {
        let storage = storage.clone();
        async move {
            Ok(storage.jobs.find(job_id).await?.and_then(|j| j.callback_status)
                == Some(CallbackStatus::Failed))
        }
    })
    .await?;

    let job = storage.jobs.find(job_id).await?.expect("job exists");
    // Job success and callback failure are orthogonal outcomes.
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.callback_attempts, 0);
    assert_eq!(storage.attempts.count_by_job(job_id).await?, 0);

    Ok(())
}

#[tokio::test]
async fn worker_starts_lazily_on_first_enqueue() -> Result<()> {
    let stack = stack().await?;

    assert!(!stack.scheduler.worker_alive());
    let status = stack.scheduler.status().await?;
    assert_eq!(status.queue_size, 0);
    assert_eq!(status.pending_jobs, 0);
    assert!(!status.worker_alive);

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&stack.env.http_mock)
        .await;

    let SubmitOutcome::Accepted { job_id, .. } = stack
        .admission
        .submit(
            json!({"report_name": "Lazy", "num_transactions": 1}),
            &stack.env.mock_url("/cb"),
            None,
        )
        .await?
    else {
        unreachable!("fresh submissions are accepted");
    };

    wait_for_status(&stack, job_id, JobStatus::Completed).await?;

    // The worker stays parked on the queue after draining it.
    assert!(stack.scheduler.worker_alive());
    let status = stack.scheduler.status().await?;
    assert_eq!(status.queue_size, 0);
    assert_eq!(status.pending_jobs, 0);
    assert!(status.worker_alive);

    Ok(())
}

#[tokio::test]
async fn shutdown_stops_the_worker_and_rejects_new_work() -> Result<()> {
    let stack = stack().await?;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&stack.env.http_mock)
        .await;

    let SubmitOutcome::Accepted { job_id, .. } = stack
        .admission
        .submit(
            json!({"report_name": "Last", "num_transactions": 1}),
            &stack.env.mock_url("/cb"),
            None,
        )
        .await?
    else {
        unreachable!("fresh submissions are accepted");
    };
    wait_for_status(&stack, job_id, JobStatus::Completed).await?;

    stack.scheduler.shutdown().await;
    assert!(!stack.scheduler.worker_alive());

    let err = stack
        .admission
        .submit(
            json!({"report_name": "Rejected", "num_transactions": 1}),
            &stack.env.mock_url("/cb"),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, conveyor_queue::AdmissionError::QueueClosed));

    Ok(())
}
