use imgpool_bus::BusError;
use imgpool_core::WorkerId;

/// Errors raised while running a worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// A job arrived while another one was still running.
    #[error("worker {worker_id} is busy")]
    Busy { worker_id: WorkerId, inbox: String },

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}
