//! Envelopes exchanged between workers and requesters.
//!
//! Each type encodes to and decodes from a `(headers, payload)` pair so
//! that it can ride on any bus message.

use crate::error::CoreError;
use crate::protocol::{
    bool_header, parse_bool_header, DEFAULT_MIMETYPE, HEADER_ACCEPTS, HEADER_MIMETYPE,
    HEADER_SUCCESS, HEADER_WORKER_ID,
};
use crate::types::{HeaderMap, WorkerId};

// ---------------------------------------------------------------------------
// ResultEnvelope
// ---------------------------------------------------------------------------

/// The single terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultEnvelope {
    /// Generation succeeded; `payload` holds the encoded image.
    Success { payload: Vec<u8>, mimetype: String },
    /// Generation failed for a human-readable `reason`.
    Failure { reason: String },
}

impl ResultEnvelope {
    pub fn success(payload: Vec<u8>, mimetype: impl Into<String>) -> Self {
        Self::Success {
            payload,
            mimetype: mimetype.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Encode into bus headers and payload bytes.
    pub fn encode(&self) -> (HeaderMap, Vec<u8>) {
        let mut headers = HeaderMap::new();
        match self {
            Self::Success { payload, mimetype } => {
                headers.insert(HEADER_SUCCESS.to_string(), bool_header(true));
                headers.insert(HEADER_MIMETYPE.to_string(), mimetype.clone());
                (headers, payload.clone())
            }
            Self::Failure { reason } => {
                headers.insert(HEADER_SUCCESS.to_string(), bool_header(false));
                (headers, reason.as_bytes().to_vec())
            }
        }
    }

    /// Decode from bus headers and payload bytes.
    ///
    /// Never fails: anything other than `success: true` is a failure whose
    /// reason is the payload read as (lossy) UTF-8.
    pub fn decode(headers: &HeaderMap, payload: &[u8]) -> Self {
        if parse_bool_header(headers.get(HEADER_SUCCESS)) {
            let mimetype = headers
                .get(HEADER_MIMETYPE)
                .cloned()
                .unwrap_or_else(|| DEFAULT_MIMETYPE.to_string());
            Self::Success {
                payload: payload.to_vec(),
                mimetype,
            }
        } else {
            Self::Failure {
                reason: String::from_utf8_lossy(payload).into_owned(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Willingness
// ---------------------------------------------------------------------------

/// A worker's answer to a solicitation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Willingness {
    pub worker_id: WorkerId,
    pub accepts: bool,
}

impl Willingness {
    pub fn encode(&self) -> (HeaderMap, Vec<u8>) {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_ACCEPTS.to_string(), bool_header(self.accepts));
        headers.insert(HEADER_WORKER_ID.to_string(), self.worker_id.to_string());
        (headers, self.worker_id.as_str().as_bytes().to_vec())
    }

    /// Decode a willingness reply.
    ///
    /// The worker id comes from the `worker-id` header, falling back to
    /// the payload. A missing `accepts` header reads as unwilling.
    pub fn decode(headers: &HeaderMap, payload: &[u8]) -> Result<Self, CoreError> {
        let worker_id = worker_id_from(headers, payload)?;
        Ok(Self {
            worker_id,
            accepts: parse_bool_header(headers.get(HEADER_ACCEPTS)),
        })
    }
}

// ---------------------------------------------------------------------------
// AssignmentNotice
// ---------------------------------------------------------------------------

/// Published by a worker when it takes a job on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentNotice {
    pub worker_id: WorkerId,
}

impl AssignmentNotice {
    pub fn encode(&self) -> (HeaderMap, Vec<u8>) {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_WORKER_ID.to_string(), self.worker_id.to_string());
        (headers, self.worker_id.as_str().as_bytes().to_vec())
    }

    pub fn decode(headers: &HeaderMap, payload: &[u8]) -> Result<Self, CoreError> {
        Ok(Self {
            worker_id: worker_id_from(headers, payload)?,
        })
    }
}

fn worker_id_from(headers: &HeaderMap, payload: &[u8]) -> Result<WorkerId, CoreError> {
    if let Some(id) = headers.get(HEADER_WORKER_ID) {
        if !id.is_empty() {
            return Ok(WorkerId::new(id.clone()));
        }
    }
    let id = std::str::from_utf8(payload)
        .map_err(|_| CoreError::Decode("Worker id is not valid UTF-8".to_string()))?
        .trim();
    if id.is_empty() {
        return Err(CoreError::Decode("Missing worker id".to_string()));
    }
    Ok(WorkerId::new(id))
}
