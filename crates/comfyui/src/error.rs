use imgpool_core::GenerationError;

use crate::api::ComfyUiApiError;

/// Errors raised while running a prompt on ComfyUI.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUiError {
    #[error(transparent)]
    Api(#[from] ComfyUiApiError),

    /// The WebSocket could not be opened.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The WebSocket closed or failed before the prompt finished.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// ComfyUI reported that the prompt failed.
    #[error("{0}")]
    Execution(String),

    /// The prompt finished without producing an image.
    #[error("No output image for prompt {0}")]
    MissingOutput(String),

    #[error("Prompt {0} did not finish in time")]
    Timeout(String),
}

impl From<ComfyUiError> for GenerationError {
    fn from(e: ComfyUiError) -> Self {
        match e {
            ComfyUiError::Execution(message) => GenerationError::Failed(message),
            other => GenerationError::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_errors_keep_the_backend_message() {
        let e: GenerationError = ComfyUiError::Execution("out of memory".into()).into();
        assert_eq!(e.to_string(), "out of memory");
    }

    #[test]
    fn other_errors_map_to_backend() {
        let e: GenerationError = ComfyUiError::Timeout("p1".into()).into();
        assert!(matches!(e, GenerationError::Backend(_)));
    }
}
