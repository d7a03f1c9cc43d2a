//! Image generation job parameters, validation and payload codec.
//!
//! The payload is the JSON object
//! `{"prompt", "numSteps", "height", "width", "seed"?}`.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Smallest accepted width or height, in pixels.
pub const MIN_DIMENSION: u32 = 32;

/// Width / height used when the operator leaves the field blank.
pub const DEFAULT_DIMENSION: u32 = 128;

/// Default number of inference steps.
pub const DEFAULT_STEPS: u32 = 4;

// ---------------------------------------------------------------------------
// JobRequest
// ---------------------------------------------------------------------------

/// Parameters of a single image generation job.
///
/// Built by the requester from validated operator input and immutable
/// once sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub prompt: String,
    #[serde(rename = "numSteps")]
    pub num_steps: u32,
    pub height: u32,
    pub width: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl JobRequest {
    /// Build and validate a request.
    pub fn new(
        prompt: impl Into<String>,
        width: u32,
        height: u32,
        num_steps: u32,
        seed: Option<u64>,
    ) -> Result<Self, CoreError> {
        let request = Self {
            prompt: prompt.into(),
            num_steps,
            height,
            width,
            seed,
        };
        request.validate()?;
        Ok(request)
    }

    /// Check every field against the protocol's limits.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation(
                "Prompt must not be empty".to_string(),
            ));
        }
        validate_dimension("width", self.width)?;
        validate_dimension("height", self.height)?;
        if self.num_steps == 0 {
            return Err(CoreError::Validation(
                "numSteps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize to the JSON payload sent over the bus.
    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| CoreError::Internal(e.to_string()))
    }

    /// Parse and validate a payload received from the bus.
    pub fn decode(payload: &[u8]) -> Result<Self, CoreError> {
        let request: Self = serde_json::from_slice(payload)
            .map_err(|e| CoreError::Decode(format!("Invalid job payload: {e}")))?;
        request
            .validate()
            .map_err(|e| CoreError::Decode(e.to_string()))?;
        Ok(request)
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Validate a single pixel dimension.
pub fn validate_dimension(field: &str, value: u32) -> Result<(), CoreError> {
    if value < MIN_DIMENSION {
        return Err(CoreError::Validation(format!(
            "{field} must be at least {MIN_DIMENSION} pixels (got {value})"
        )));
    }
    Ok(())
}

/// Interpret operator input for a width or height field.
///
/// Blank input selects [`DEFAULT_DIMENSION`]; anything else must be an
/// integer no smaller than [`MIN_DIMENSION`].
pub fn parse_dimension_input(field: &str, input: &str) -> Result<u32, CoreError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(DEFAULT_DIMENSION);
    }
    let value: u32 = input.parse().map_err(|_| {
        CoreError::Validation(format!("{field} must be a whole number (got '{input}')"))
    })?;
    validate_dimension(field, value)?;
    Ok(value)
}
