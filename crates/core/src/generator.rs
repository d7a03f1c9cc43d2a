//! The image generation seam.
//!
//! Workers hand validated [`JobRequest`]s to an [`ImageGenerator`] and
//! receive encoded image bytes back. Generators report progress through
//! a [`ProgressReporter`], which never blocks the generation itself.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::job::JobRequest;
use crate::progress::ProgressUpdate;

/// An encoded image produced by a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mimetype: String,
}

/// Errors raised by a generator backend.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The backend rejected the request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The backend could not be reached or misbehaved.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The generation itself failed; the message comes from the backend.
    #[error("{0}")]
    Failed(String),
}

/// Produces images from job parameters.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one image, reporting progress as it happens.
    async fn generate(
        &self,
        request: &JobRequest,
        progress: ProgressReporter,
    ) -> Result<GeneratedImage, GenerationError>;
}

// ---------------------------------------------------------------------------
// ProgressReporter
// ---------------------------------------------------------------------------

/// Non-blocking, cloneable handle for reporting job progress.
///
/// Updates are queued on an unbounded channel that the worker drains
/// and publishes. Reporting after the receiver is gone is a no-op.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

impl ProgressReporter {
    /// A reporter paired with the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A reporter that discards every update.
    pub fn noop() -> Self {
        Self { tx: None }
    }

    /// Report completion percentage (clamped into `0..=100`).
    pub fn report(&self, percent: f64) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressUpdate::new(percent));
        }
    }
}
