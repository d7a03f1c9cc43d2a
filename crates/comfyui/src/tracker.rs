//! Follows one prompt's execution over the ComfyUI WebSocket.
//!
//! Reads frames until the prompt completes or fails, forwarding
//! step-level progress to a [`ProgressReporter`]. Messages about other
//! prompts (the socket is shared with whatever else ComfyUI is doing)
//! are ignored.

use futures::{Stream, StreamExt};
use imgpool_core::ProgressReporter;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::error::ComfyUiError;
use crate::messages::{parse_message, ComfyUiMessage};

/// How a tracked prompt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    Completed,
    Failed(String),
    Interrupted,
}

/// Consume WebSocket frames until `prompt_id` finishes.
///
/// Returns an error only if the stream ends or fails before an outcome
/// is known.
pub async fn track_prompt<S>(
    stream: &mut S,
    prompt_id: &str,
    progress: &ProgressReporter,
) -> Result<PromptOutcome, ComfyUiError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Some(outcome) = handle_text(&text, prompt_id, progress) {
                    return Ok(outcome);
                }
            }
            Ok(Message::Binary(_)) => {
                // Preview images.
                tracing::trace!(prompt_id, "Ignoring binary frame");
            }
            Ok(Message::Close(frame)) => {
                return Err(ComfyUiError::Protocol(format!(
                    "ComfyUI closed the WebSocket before prompt {prompt_id} finished ({frame:?})"
                )));
            }
            Ok(_) => {}
            Err(e) => {
                return Err(ComfyUiError::Protocol(format!("WebSocket receive error: {e}")));
            }
        }
    }

    Err(ComfyUiError::Protocol(format!(
        "WebSocket ended before prompt {prompt_id} finished"
    )))
}

fn handle_text(text: &str, prompt_id: &str, progress: &ProgressReporter) -> Option<PromptOutcome> {
    let message = match parse_message(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, raw_message = %text, "Failed to parse ComfyUI message");
            return None;
        }
    };

    // Progress frames from older builds carry no prompt id; they are
    // attributed to the prompt we are following.
    if message.prompt_id().is_some_and(|id| id != prompt_id) {
        return None;
    }

    match message {
        ComfyUiMessage::ExecutionStart(_) => {
            tracing::info!(prompt_id, "Execution started");
            None
        }
        ComfyUiMessage::Progress(data) => {
            let percent = data.percent();
            tracing::debug!(prompt_id, value = data.value, max = data.max, percent, "Generation progress");
            progress.report(percent);
            None
        }
        ComfyUiMessage::Executing(data) => match data.node {
            Some(node) => {
                tracing::debug!(prompt_id, node = %node, "Executing node");
                None
            }
            None if data.prompt_id.is_some() => Some(PromptOutcome::Completed),
            None => None,
        },
        ComfyUiMessage::ExecutionSuccess(_) => Some(PromptOutcome::Completed),
        ComfyUiMessage::ExecutionError(data) => {
            tracing::error!(
                prompt_id,
                node_id = ?data.node_id,
                error_type = ?data.exception_type,
                error_message = %data.exception_message,
                "Execution error",
            );
            Some(PromptOutcome::Failed(data.exception_message))
        }
        ComfyUiMessage::ExecutionInterrupted(_) => Some(PromptOutcome::Interrupted),
        ComfyUiMessage::Other => None,
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn text(s: &str) -> Result<Message, WsError> {
        Ok(Message::Text(s.to_string()))
    }

    #[tokio::test]
    async fn completes_and_reports_progress() {
        let frames = vec![
            text(r#"{"type":"status","data":{"status":{}}}"#),
            text(r#"{"type":"execution_start","data":{"prompt_id":"p1"}}"#),
            text(r#"{"type":"progress","data":{"value":1,"max":4,"prompt_id":"p1"}}"#),
            text(r#"{"type":"progress","data":{"value":2,"max":4}}"#),
            text(r#"{"type":"executing","data":{"node":"9","prompt_id":"p1"}}"#),
            text(r#"{"type":"executing","data":{"node":null,"prompt_id":"p1"}}"#),
        ];
        let mut s = stream::iter(frames);
        let (reporter, mut rx) = ProgressReporter::channel();

        let outcome = track_prompt(&mut s, "p1", &reporter).await.unwrap();
        assert_eq!(outcome, PromptOutcome::Completed);

        assert_eq!(rx.recv().await.unwrap().percent(), 25.0);
        assert_eq!(rx.recv().await.unwrap().percent(), 50.0);
    }

    #[tokio::test]
    async fn other_prompts_are_ignored() {
        let frames = vec![
            text(r#"{"type":"executing","data":{"node":null,"prompt_id":"other"}}"#),
            text(r#"{"type":"progress","data":{"value":1,"max":2,"prompt_id":"other"}}"#),
            text(r#"{"type":"execution_success","data":{"prompt_id":"p1"}}"#),
        ];
        let mut s = stream::iter(frames);
        let (reporter, mut rx) = ProgressReporter::channel();

        let outcome = track_prompt(&mut s, "p1", &reporter).await.unwrap();
        assert_eq!(outcome, PromptOutcome::Completed);
        drop(reporter);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn execution_error_carries_message() {
        let frames = vec![text(
            r#"{"type":"execution_error","data":{"prompt_id":"p1","node_id":"3","exception_message":"CUDA out of memory","exception_type":"RuntimeError"}}"#,
        )];
        let mut s = stream::iter(frames);
        let outcome = track_prompt(&mut s, "p1", &ProgressReporter::noop()).await.unwrap();
        assert_eq!(outcome, PromptOutcome::Failed("CUDA out of memory".into()));
    }

    #[tokio::test]
    async fn stream_ending_early_is_an_error() {
        let frames = vec![text(r#"{"type":"execution_start","data":{"prompt_id":"p1"}}"#)];
        let mut s = stream::iter(frames);
        let result = track_prompt(&mut s, "p1", &ProgressReporter::noop()).await;
        assert!(matches!(result, Err(ComfyUiError::Protocol(_))));
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let frames = vec![
            text("garbage"),
            text(r#"{"type":"execution_interrupted","data":{"prompt_id":"p1"}}"#),
        ];
        let mut s = stream::iter(frames);
        let outcome = track_prompt(&mut s, "p1", &ProgressReporter::noop()).await.unwrap();
        assert_eq!(outcome, PromptOutcome::Interrupted);
    }
}
