//! ComfyUI-backed image generation for imgpool workers.
//!
//! Submits a text-to-image workflow over the ComfyUI REST API, follows
//! its execution over the ComfyUI WebSocket to stream progress, then
//! downloads the produced image.

pub mod api;
pub mod error;
pub mod generator;
pub mod messages;
pub mod tracker;
pub mod workflow;

pub use error::ComfyUiError;
pub use generator::{ComfyUiConfig, ComfyUiGenerator};
