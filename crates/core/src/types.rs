use std::collections::BTreeMap;
use std::fmt;

use crate::error::CoreError;

/// Maximum length of a configured worker id.
const MAX_WORKER_ID_LEN: usize = 128;

/// Message headers as carried on the bus: string keys to string values.
pub type HeaderMap = BTreeMap<String, String>;

/// Opaque identity of a single worker process.
///
/// Generated once at start-up (UUID v4) unless configured explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse an operator-supplied worker id.
    ///
    /// The id becomes a token of the worker's private job subject, so it
    /// must be non-empty and may only contain alphanumeric, hyphen or
    /// underscore characters (no subject separators or wildcards).
    pub fn parse(id: &str) -> Result<Self, CoreError> {
        if id.is_empty() {
            return Err(CoreError::Validation(
                "Worker id must not be empty".to_string(),
            ));
        }
        if id.len() > MAX_WORKER_ID_LEN {
            return Err(CoreError::Validation(format!(
                "Worker id must not exceed {MAX_WORKER_ID_LEN} characters"
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::Validation(
                "Worker id may only contain alphanumeric, hyphen, or underscore characters"
                    .to_string(),
            ));
        }
        Ok(Self(id.to_string()))
    }

    /// A fresh random identity.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
