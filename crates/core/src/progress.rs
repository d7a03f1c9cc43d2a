//! Progress updates streamed while a job runs.
//!
//! The payload is a single decimal percentage in `0..=100` as UTF-8
//! text. Updates carry no sequence number and may arrive out of order
//! or not at all.

use std::fmt;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ProgressUpdate(f64);

impl ProgressUpdate {
    /// Construct from a percentage, clamped into `0..=100`.
    ///
    /// NaN is treated as 0.
    pub fn new(percent: f64) -> Self {
        if percent.is_nan() {
            return Self(0.0);
        }
        Self(percent.clamp(0.0, 100.0))
    }

    /// Percentage after completing `step` of `total` steps.
    pub fn from_steps(step: u32, total: u32) -> Self {
        if total == 0 {
            return Self(0.0);
        }
        Self::new(step as f64 / total as f64 * 100.0)
    }

    pub fn percent(&self) -> f64 {
        self.0
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, CoreError> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| CoreError::Decode("Progress payload is not valid UTF-8".to_string()))?;
        let percent: f64 = text.trim().parse().map_err(|_| {
            CoreError::Decode(format!("Progress payload is not a number: '{text}'"))
        })?;
        Ok(Self::new(percent))
    }
}

impl fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
