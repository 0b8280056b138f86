//! Core domain models, errors, and storage for the conveyor pipeline.
//!
//! Provides strongly-typed domain primitives, the storage repositories, and
//! the clock abstraction. The other crates depend on these foundational types
//! for type safety and consistency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    Attempt, AttemptId, CallbackStatus, Job, JobId, JobMode, JobStatus, NewAttempt,
};
pub use storage::Storage;
pub use time::{Clock, ManualClock, SystemClock};
