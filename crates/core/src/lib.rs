//! Shared domain types for the imgpool job dispatch protocol.
//!
//! Everything in this crate is transport-agnostic: the codecs produce
//! and consume plain header maps and byte payloads so that both the
//! worker and the requester can speak the protocol over any
//! [`imgpool_bus`](../imgpool_bus/index.html) implementation.

pub mod envelope;
pub mod error;
pub mod generator;
pub mod job;
pub mod progress;
pub mod protocol;
pub mod subjects;
pub mod types;

pub use envelope::{AssignmentNotice, ResultEnvelope, Willingness};
pub use error::CoreError;
pub use generator::{GeneratedImage, GenerationError, ImageGenerator, ProgressReporter};
pub use job::JobRequest;
pub use progress::ProgressUpdate;
pub use subjects::CorrelationSubjects;
pub use types::{HeaderMap, WorkerId};
