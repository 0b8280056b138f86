//! FIFO scheduler owning the queue and the single worker's lifecycle.
//!
//! The queue is an unbounded in-process channel: insertion order equals
//! removal order, no priorities, no reordering. Exactly one consumer exists
//! at any time, started lazily on first enqueue and restarted by a later
//! enqueue if it ever dies. The start-if-absent check is double-checked
//! against a mutex-guarded worker handle so concurrent admissions racing to
//! (re)start the worker resolve to exactly one live instance.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard,
};

use conveyor_core::{Clock, JobId, Result, Storage};
use conveyor_delivery::DeliveryEngine;
use conveyor_report::ReportGenerator;
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::worker::{self, WorkerContext};

/// Error returned when enqueueing after shutdown.
#[derive(Debug, Error)]
#[error("scheduler is shut down")]
pub struct QueueClosed;

/// Snapshot of queue and worker health for the introspection API.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Job ids enqueued but not yet dequeued.
    pub queue_size: usize,

    /// Jobs persisted in PENDING status.
    pub pending_jobs: i64,

    /// Whether the consumer task is currently live.
    pub worker_alive: bool,
}

/// Owns the FIFO queue and the mutex-guarded worker slot.
pub struct Scheduler {
    tx: UnboundedSender<JobId>,
    /// The receiver is shared behind a lock so a replacement worker can adopt
    /// the same queue after an unexpected termination; undequeued ids are
    /// never lost with the task that was draining them.
    rx: Arc<tokio::sync::Mutex<UnboundedReceiver<JobId>>>,
    worker_slot: Mutex<Option<JoinHandle<()>>>,
    depth: Arc<AtomicUsize>,
    shutdown: CancellationToken,
    ctx: Arc<WorkerContext>,
}

impl Scheduler {
    /// Creates a scheduler. No worker is started until the first enqueue.
    pub fn new(
        storage: Storage,
        generator: Arc<ReportGenerator>,
        engine: Arc<DeliveryEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            worker_slot: Mutex::new(None),
            depth: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
            ctx: Arc::new(WorkerContext { storage, generator, engine, clock }),
        }
    }

    /// Appends a job id to the queue and starts the worker if needed.
    ///
    /// # Errors
    ///
    /// Returns `QueueClosed` after shutdown.
    pub fn enqueue(&self, job_id: JobId) -> std::result::Result<(), QueueClosed> {
        if self.shutdown.is_cancelled() {
            return Err(QueueClosed);
        }

        self.tx.send(job_id).map_err(|_| QueueClosed)?;
        self.depth.fetch_add(1, Ordering::SeqCst);
        info!(job_id = %job_id, queue_size = self.queue_size(), "job enqueued");

        self.ensure_worker();
        Ok(())
    }

    /// Starts the worker if none is alive. Safe under concurrent admissions:
    /// check, lock, re-check, and only then spawn.
    fn ensure_worker(&self) {
        {
            let slot = self.lock_slot();
            if worker_is_live(&slot) {
                return;
            }
        }

        let mut slot = self.lock_slot();
        // Re-check under the lock; a concurrent admission may have won.
        if worker_is_live(&slot) {
            return;
        }
        if self.shutdown.is_cancelled() {
            return;
        }

        info!("starting queue worker");
        let handle = tokio::spawn(worker::run(
            self.ctx.clone(),
            self.rx.clone(),
            self.depth.clone(),
            self.shutdown.clone(),
        ));
        *slot = Some(handle);
    }

    /// Whether the consumer task is currently live.
    pub fn worker_alive(&self) -> bool {
        worker_is_live(&self.lock_slot())
    }

    /// Number of ids enqueued but not yet dequeued.
    pub fn queue_size(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Builds the introspection snapshot.
    ///
    /// # Errors
    ///
    /// Returns error if the pending-job count query fails.
    pub async fn status(&self) -> Result<QueueStatus> {
        let pending_jobs = self.ctx.storage.jobs.count_pending().await?;

        Ok(QueueStatus {
            queue_size: self.queue_size(),
            pending_jobs,
            worker_alive: self.worker_alive(),
        })
    }

    /// Stops the worker after its current job and waits for it to exit.
    ///
    /// Queued-but-undequeued jobs stay in the database as PENDING; nothing
    /// in-flight is aborted.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handle = self.lock_slot().take();
        if let Some(handle) = handle {
            info!("waiting for queue worker to stop");
            if let Err(error) = handle.await {
                tracing::error!(error = %error, "queue worker task failed during shutdown");
            }
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.worker_slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn worker_is_live(slot: &MutexGuard<'_, Option<JoinHandle<()>>>) -> bool {
    slot.as_ref().is_some_and(|handle| !handle.is_finished())
}
