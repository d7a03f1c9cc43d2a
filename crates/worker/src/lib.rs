//! Pool worker for imgpool.
//!
//! A worker answers solicitations with its willingness, accepts at most
//! one job at a time on its private subject, runs it through an
//! [`ImageGenerator`](imgpool_core::ImageGenerator) and publishes
//! assignment, progress and a single terminal result on the job's
//! correlation subjects.

pub mod config;
pub mod error;
pub mod state;
pub mod synthetic;
pub mod worker;

pub use config::{ConfigError, GeneratorKind, WorkerConfig};
pub use error::WorkerError;
pub use state::{JobGuard, WorkerSession, WorkerState};
pub use synthetic::SyntheticGenerator;
pub use worker::Worker;
