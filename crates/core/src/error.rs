#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
