//! The single consumer loop and per-job pipeline.
//!
//! The worker drains the queue one id at a time and runs each job to full
//! completion, report generation and webhook delivery included, before
//! touching the next. A stalled receiver therefore stalls the whole queue
//! behind it; that head-of-line blocking is the accepted price of strict
//! ordering. Every per-job failure is caught at the loop boundary so a bad
//! job never takes the consumer down with it.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use conveyor_core::{CallbackStatus, Clock, JobId, Storage};
use conveyor_delivery::{is_safe_callback_url, DeliveryEngine, Result};
use conveyor_report::ReportGenerator;
use serde_json::{json, Value as JsonValue};
use tokio::sync::{mpsc::UnboundedReceiver, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Shared dependencies for the consumer task.
pub(crate) struct WorkerContext {
    pub storage: Storage,
    pub generator: Arc<ReportGenerator>,
    pub engine: Arc<DeliveryEngine>,
    pub clock: Arc<dyn Clock>,
}

/// Consumer loop: blocks on the queue, processes jobs strictly in order.
pub(crate) async fn run(
    ctx: Arc<WorkerContext>,
    rx: Arc<Mutex<UnboundedReceiver<JobId>>>,
    depth: Arc<AtomicUsize>,
    shutdown: CancellationToken,
) {
    info!("queue worker started");

    loop {
        let job_id = {
            let mut receiver = rx.lock().await;
            tokio::select! {
                () = shutdown.cancelled() => break,
                received = receiver.recv() => match received {
                    Some(job_id) => job_id,
                    None => break,
                },
            }
        };

        depth.fetch_sub(1, Ordering::SeqCst);
        info!(job_id = %job_id, "job dequeued");

        if let Err(err) = process_job(&ctx, job_id).await {
            // Per-job error boundary: log and move on, never halt the loop.
            error!(job_id = %job_id, error = %err, "job processing failed");
        }
    }

    info!("queue worker stopped");
}

/// Runs one job to a terminal status, then delivers its callback.
async fn process_job(ctx: &WorkerContext, job_id: JobId) -> Result<()> {
    let Some(job) = ctx.storage.jobs.find(job_id).await? else {
        // Not fatal to the loop; the row may have been deleted since enqueue.
        warn!(job_id = %job_id, "dequeued job not found, skipping");
        return Ok(());
    };

    ctx.storage.jobs.mark_processing(job_id).await?;

    let result = match generate(ctx, job.input().clone()).await {
        Ok(result) => result,
        Err(message) => {
            warn!(job_id = %job_id, error = %message, "report generation failed");
            ctx.storage.jobs.mark_failed(job_id, &json!({ "error": message })).await?;
            return Ok(());
        },
    };

    ctx.storage.jobs.mark_completed(job_id, &result, ctx.clock.now_utc()).await?;
    info!(job_id = %job_id, "job completed");

    let Some(callback_url) = job.callback_url else {
        return Ok(());
    };

    if !is_safe_callback_url(&callback_url) {
        // Policy short-circuit: no network call, no attempt row.
        warn!(job_id = %job_id, url = %callback_url, "callback URL blocked, delivery skipped");
        ctx.storage.jobs.set_callback_status(job_id, CallbackStatus::Failed).await?;
        return Ok(());
    }

    let payload = callback_payload(job_id, &result);
    let delivered = ctx.engine.deliver(job_id, &callback_url, &payload).await?;
    if !delivered {
        warn!(job_id = %job_id, url = %callback_url, "callback delivery exhausted its retry budget");
    }

    Ok(())
}

/// Runs the generator off the async runtime; generation is CPU-bound and
/// intentionally unbounded in duration.
async fn generate(ctx: &WorkerContext, input: JsonValue) -> std::result::Result<JsonValue, String> {
    let generator = ctx.generator.clone();

    match tokio::task::spawn_blocking(move || generator.generate(&input)).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(error)) => Err(error.to_string()),
        Err(join_error) => Err(format!("report generation panicked: {join_error}")),
    }
}

/// Builds the webhook body: the flattened generator result plus the
/// authoritative request fields.
pub(crate) fn callback_payload(job_id: JobId, result: &JsonValue) -> JsonValue {
    let mut body = serde_json::Map::new();

    if let Some(fields) = result.as_object() {
        for (key, value) in fields {
            body.insert(key.clone(), value.clone());
        }
    }
    body.insert("request_id".to_string(), json!(job_id.to_string()));
    body.insert("status".to_string(), json!("completed"));

    JsonValue::Object(body)
}
