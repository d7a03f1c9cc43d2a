use std::time::Duration;

use imgpool_bus::BusError;
use imgpool_core::CoreError;

/// Reasons a dispatch ended without a terminal result.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The request failed validation and was never sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[source] CoreError),

    #[error("No willing worker after {attempts} attempts")]
    NoWillingWorker { attempts: u32 },

    #[error("No result within {0:?}")]
    ResultTimeout(Duration),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

/// Errors that end an operator session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
