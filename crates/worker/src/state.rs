//! The worker state machine.
//!
//! A worker is either [`Idle`](WorkerState::Idle) or
//! [`Busy`](WorkerState::Busy). The only way into `Busy` is
//! [`WorkerSession::try_begin`], and the only way out is dropping the
//! [`JobGuard`] it returns, so the state resets on every exit path of a
//! job, including a failed result publish or a panic.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use imgpool_core::{Willingness, WorkerId};

use crate::error::WorkerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    /// Running the job correlated by `inbox`.
    Busy { inbox: String },
}

/// Per-worker session owning the state.
#[derive(Debug)]
pub struct WorkerSession {
    id: WorkerId,
    state: Mutex<WorkerState>,
}

impl WorkerSession {
    pub fn new(id: WorkerId) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(WorkerState::Idle),
        })
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Answer a solicitation from the state at this instant.
    pub fn willingness(&self) -> Willingness {
        Willingness {
            worker_id: self.id.clone(),
            accepts: matches!(*self.lock(), WorkerState::Idle),
        }
    }

    /// Move `Idle -> Busy` for the job correlated by `inbox`.
    ///
    /// Fails with [`WorkerError::Busy`] without touching the running job.
    pub fn try_begin(self: &Arc<Self>, inbox: &str) -> Result<JobGuard, WorkerError> {
        let mut state = self.lock();
        if let WorkerState::Busy { inbox: current } = &*state {
            tracing::warn!(
                worker_id = %self.id,
                current = %current,
                rejected = %inbox,
                "Rejecting overlapping job",
            );
            return Err(WorkerError::Busy {
                worker_id: self.id.clone(),
                inbox: inbox.to_string(),
            });
        }
        *state = WorkerState::Busy {
            inbox: inbox.to_string(),
        };
        tracing::info!(worker_id = %self.id, inbox = %inbox, "Idle -> Busy");
        Ok(JobGuard {
            session: Arc::clone(self),
            inbox: inbox.to_string(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof that the session is busy with one job; dropping it returns the
/// session to `Idle`.
#[derive(Debug)]
pub struct JobGuard {
    session: Arc<WorkerSession>,
    inbox: String,
}

impl JobGuard {
    pub fn inbox(&self) -> &str {
        &self.inbox
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        *self.session.lock() = WorkerState::Idle;
        tracing::info!(worker_id = %self.session.id, inbox = %self.inbox, "Busy -> Idle");
    }
}
