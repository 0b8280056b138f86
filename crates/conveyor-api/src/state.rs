//! Shared handler state.

use std::sync::Arc;

use conveyor_core::Storage;
use conveyor_queue::{Admission, Scheduler};

use crate::handlers::receiver::ReceiverState;

/// Dependencies shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Job and attempt repositories.
    pub storage: Storage,

    /// Admission gateway for sync and async submissions.
    pub admission: Arc<Admission>,

    /// Scheduler, for queue introspection.
    pub scheduler: Arc<Scheduler>,

    /// In-memory state of the demo callback receiver.
    pub receiver: Arc<ReceiverState>,
}
