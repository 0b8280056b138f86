//! End-to-end tests of the HTTP surface: admission, inspection, queue
//! introspection, and the demo callback receiver loop.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use conveyor_api::{router, AppState};
use conveyor_core::{Clock, SystemClock};
use conveyor_delivery::{
    client::ClientConfig,
    engine::{DeliveryConfig, DeliveryEngine},
    retry::BackoffSchedule,
};
use conveyor_queue::{Admission, Scheduler};
use conveyor_report::{GeneratorConfig, ReportGenerator};
use conveyor_testing::{wait_until, TestEnv};
use serde_json::{json, Value as JsonValue};

struct Server {
    /// Keeps the temp database and reports directory alive for the test.
    _env: TestEnv,
    base_url: String,
    client: reqwest::Client,
}

impl Server {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Callback URL pointing at this server's own demo receiver; the SSRF
    /// guard exempts this loopback path.
    fn receiver_url(&self) -> String {
        self.url("/api/callbacks/receive")
    }
}

async fn spawn_server() -> Result<Server> {
    let env = TestEnv::new().await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let generator = Arc::new(ReportGenerator::new(GeneratorConfig {
        reports_dir: env.reports_dir.clone(),
        transaction_cost: Duration::ZERO,
        max_transactions: 1_000,
    }));
    // Compressed backoff keeps the exhaustion path fast in tests.
    let delivery_config = DeliveryConfig {
        client: ClientConfig { timeout: Duration::from_secs(2), ..ClientConfig::default() },
        backoff: BackoffSchedule::new(
            3,
            vec![Duration::from_millis(50), Duration::from_millis(100)],
        ),
    };
    let engine =
        Arc::new(DeliveryEngine::new(env.storage(), delivery_config, clock.clone())?);
    let scheduler =
        Arc::new(Scheduler::new(env.storage(), generator.clone(), engine, clock.clone()));
    let admission =
        Arc::new(Admission::new(env.storage(), scheduler.clone(), generator, clock));

    let state = AppState {
        storage: env.storage(),
        admission,
        scheduler,
        receiver: Arc::default(),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router(state)).await;
    });

    Ok(Server {
        _env: env,
        base_url: format!("http://{addr}"),
        client: reqwest::Client::new(),
    })
}

async fn wait_for_job_status(server: &Server, request_id: &str, expected: &str) -> Result<JsonValue> {
    let url = server.url(&format!("/api/requests/{request_id}"));

    wait_until(&format!("request {request_id} reaches {expected}"), Duration::from_secs(10), || {
        let client = server.client.clone();
        let url = url.clone();
        let expected = expected.to_string();
        async move {
            let body: JsonValue = client.get(&url).send().await?.json().await?;
            Ok(body["status"] == expected.as_str())
        }
    })
    .await?;

    let body: JsonValue = server.client.get(&url).send().await?.json().await?;
    Ok(body)
}

#[tokio::test]
async fn async_submission_flows_through_to_the_demo_receiver() -> Result<()> {
    let server = spawn_server().await?;

    let response = server
        .client
        .post(server.url("/api/async"))
        .json(&json!({
            "payload": {"report_name": "EndToEnd", "num_transactions": 2},
            "callback_url": server.receiver_url(),
        }))
        .send()
        .await?;

    assert_eq!(response.status(), 202);
    let body: JsonValue = response.json().await?;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["queue_position"], 1);
    let request_id = body["request_id"].as_str().unwrap().to_string();

    let job = wait_for_job_status(&server, &request_id, "COMPLETED").await?;
    assert_eq!(job["mode"], "async");
    assert_eq!(job["result_payload"]["summary"]["total_transactions"], 2);

    // One successful attempt in the log.
    wait_until("callback delivered", Duration::from_secs(5), || {
        let client = server.client.clone();
        let url = server.url(&format!("/api/requests/{request_id}"));
        async move {
            let body: JsonValue = client.get(&url).send().await?.json().await?;
            Ok(body["callback_status"] == "SUCCESS")
        }
    })
    .await?;

    let logs: JsonValue = server
        .client
        .get(server.url(&format!("/api/requests/{request_id}/callback-logs")))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(logs["total_attempts"], 1);
    assert_eq!(logs["logs"][0]["success"], true);

    // The receiver recorded the webhook body.
    let history: JsonValue =
        server.client.get(server.url("/api/callbacks/history")).send().await?.json().await?;
    assert_eq!(history["total"], 1);
    assert_eq!(history["callbacks"][0]["request_id"], request_id.as_str());
    assert_eq!(history["callbacks"][0]["status"], "completed");

    Ok(())
}

#[tokio::test]
async fn idempotency_header_dedups_submissions() -> Result<()> {
    let server = spawn_server().await?;

    let submit = |server: &Server| {
        server
            .client
            .post(server.url("/api/async"))
            .header("X-Idempotency-Key", "api-key-1")
            .json(&json!({
                "payload": {"report_name": "Dup", "num_transactions": 1},
                "callback_url": server.receiver_url(),
            }))
            .send()
    };

    let first = submit(&server).await?;
    assert_eq!(first.status(), 202);
    let first_body: JsonValue = first.json().await?;

    let second = submit(&server).await?;
    assert_eq!(second.status(), 200);
    let second_body: JsonValue = second.json().await?;

    assert_eq!(second_body["status"], "duplicate");
    assert_eq!(second_body["request_id"], first_body["request_id"]);

    Ok(())
}

#[tokio::test]
async fn missing_callback_url_is_a_validation_error() -> Result<()> {
    let server = spawn_server().await?;

    let response = server
        .client
        .post(server.url("/api/async"))
        .json(&json!({"payload": {"report_name": "NoHook"}}))
        .send()
        .await?;

    assert_eq!(response.status(), 400);
    let body: JsonValue = response.json().await?;
    assert_eq!(body["error"]["code"], "missing_callback_url");

    // Nothing was admitted.
    let listing: JsonValue =
        server.client.get(server.url("/api/requests")).send().await?.json().await?;
    assert_eq!(listing["requests"].as_array().unwrap().len(), 0);

    Ok(())
}

#[tokio::test]
async fn failing_receiver_exhausts_retries_and_audits_them() -> Result<()> {
    let server = spawn_server().await?;

    // Every callback now answers 500.
    let response = server
        .client
        .post(server.url("/api/callbacks/simulate-failures?enabled=true&failure_rate=100"))
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let body: JsonValue = server
        .client
        .post(server.url("/api/async"))
        .json(&json!({
            "payload": {"report_name": "Unlucky", "num_transactions": 1},
            "callback_url": server.receiver_url(),
        }))
        .send()
        .await?
        .json()
        .await?;
    let request_id = body["request_id"].as_str().unwrap().to_string();

    wait_until("callback retries exhausted", Duration::from_secs(10), || {
        let client = server.client.clone();
        let url = server.url(&format!("/api/requests/{request_id}"));
        async move {
            let body: JsonValue = client.get(&url).send().await?.json().await?;
            Ok(body["callback_status"] == "FAILED")
        }
    })
    .await?;

    let job: JsonValue = server
        .client
        .get(server.url(&format!("/api/requests/{request_id}")))
        .send()
        .await?
        .json()
        .await?;
    // The job itself still completed; only the callback failed.
    assert_eq!(job["status"], "COMPLETED");
    assert_eq!(job["callback_attempts"], 3);

    let logs: JsonValue = server
        .client
        .get(server.url(&format!("/api/requests/{request_id}/callback-logs")))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(logs["total_attempts"], 3);
    for (index, log) in logs["logs"].as_array().unwrap().iter().enumerate() {
        assert_eq!(log["attempt_number"], index as i64 + 1);
        assert_eq!(log["success"], false);
        assert_eq!(log["status_code"], 500);
    }

    Ok(())
}

#[tokio::test]
async fn sync_endpoint_runs_inline_and_enforces_its_limit() -> Result<()> {
    let server = spawn_server().await?;

    let response = server
        .client
        .post(server.url("/api/sync"))
        .json(&json!({"payload": {"report_name": "Quick", "num_transactions": 3}}))
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let body: JsonValue = response.json().await?;
    assert_eq!(body["mode"], "sync");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["summary"]["total_transactions"], 3);

    let oversized = server
        .client
        .post(server.url("/api/sync"))
        .json(&json!({"payload": {"report_name": "Huge", "num_transactions": 500}}))
        .send()
        .await?;

    assert_eq!(oversized.status(), 400);
    let error: JsonValue = oversized.json().await?;
    assert_eq!(error["error"]["code"], "sync_limit_exceeded");

    Ok(())
}

#[tokio::test]
async fn queue_status_reports_shape() -> Result<()> {
    let server = spawn_server().await?;

    let status: JsonValue =
        server.client.get(server.url("/api/queue/status")).send().await?.json().await?;

    assert_eq!(status["queue_size"], 0);
    assert_eq!(status["pending_jobs"], 0);
    assert_eq!(status["worker_alive"], false);

    Ok(())
}

#[tokio::test]
async fn unknown_and_invalid_request_ids_are_client_errors() -> Result<()> {
    let server = spawn_server().await?;

    let missing = server
        .client
        .get(server.url("/api/requests/00000000-0000-4000-8000-000000000000"))
        .send()
        .await?;
    assert_eq!(missing.status(), 404);

    let invalid = server.client.get(server.url("/api/requests/not-a-uuid")).send().await?;
    assert_eq!(invalid.status(), 400);

    let bad_filter =
        server.client.get(server.url("/api/requests?mode=sideways")).send().await?;
    assert_eq!(bad_filter.status(), 400);

    Ok(())
}

#[tokio::test]
async fn deletion_endpoints_remove_rows() -> Result<()> {
    let server = spawn_server().await?;

    let body: JsonValue = server
        .client
        .post(server.url("/api/sync"))
        .json(&json!({"payload": {"report_name": "Doomed", "num_transactions": 1}}))
        .send()
        .await?
        .json()
        .await?;
    let request_id = body["request_id"].as_str().unwrap().to_string();

    let deleted: JsonValue = server
        .client
        .delete(server.url(&format!("/api/requests/{request_id}")))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(deleted["deleted"], true);

    let gone = server
        .client
        .get(server.url(&format!("/api/requests/{request_id}")))
        .send()
        .await?;
    assert_eq!(gone.status(), 404);

    let wiped: JsonValue =
        server.client.delete(server.url("/api/requests")).send().await?.json().await?;
    assert_eq!(wiped["deleted"], true);

    Ok(())
}
