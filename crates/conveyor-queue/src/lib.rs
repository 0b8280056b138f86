//! FIFO queue core: admission, scheduling, and the single worker.
//!
//! Jobs are admitted concurrently but processed strictly one at a time in
//! arrival order. The scheduler owns an unbounded in-process queue and at
//! most one consumer task, started lazily on first enqueue. This trades
//! horizontal throughput for a strict global ordering guarantee: completion
//! order always equals admission order, and cross-job races on shared
//! counters cannot occur because nothing runs concurrently.

#![forbid(unsafe_code)]

pub mod admission;
pub mod scheduler;
mod worker;

pub use admission::{Admission, AdmissionError, SubmitOutcome, SyncOutcome};
pub use scheduler::{QueueStatus, Scheduler};
