//! ComfyUI WebSocket message types and parser.
//!
//! ComfyUI sends JSON messages shaped `{"type": "<kind>", "data": {...}}`.
//! Only the kinds that matter for following a single prompt are typed;
//! everything else parses as [`ComfyUiMessage::Other`].

use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub enum ComfyUiMessage {
    /// A prompt has started executing.
    ExecutionStart(PromptRef),

    /// A specific node is executing; `node == None` means the prompt finished.
    Executing(ExecutingData),

    /// Step-level progress within a long-running node (e.g. KSampler).
    Progress(ProgressData),

    /// The prompt finished successfully (newer ComfyUI builds).
    ExecutionSuccess(PromptRef),

    /// Execution failed with an error.
    ExecutionError(ErrorData),

    /// Execution was interrupted.
    ExecutionInterrupted(PromptRef),

    /// Status broadcasts, cached-node notices and anything newer.
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptRef {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Current step number.
    pub value: i64,
    /// Total number of steps.
    pub max: i64,
    /// Present on newer ComfyUI builds.
    #[serde(default)]
    pub prompt_id: Option<String>,
}

impl ProgressData {
    /// Completion percentage in `0..=100`.
    pub fn percent(&self) -> f64 {
        if self.max > 0 {
            (self.value as f64 / self.max as f64 * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: Option<String>,
}

impl ComfyUiMessage {
    /// The prompt a message refers to, when it names one.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            Self::ExecutionStart(p) | Self::ExecutionSuccess(p) | Self::ExecutionInterrupted(p) => {
                Some(&p.prompt_id)
            }
            Self::Executing(d) => d.prompt_id.as_deref(),
            Self::Progress(d) => d.prompt_id.as_deref(),
            Self::ExecutionError(d) => Some(&d.prompt_id),
            Self::Other => None,
        }
    }
}

/// Parse a ComfyUI WebSocket text message.
///
/// Unknown `type` values parse as [`ComfyUiMessage::Other`]; only
/// malformed JSON or malformed known payloads are errors.
pub fn parse_message(text: &str) -> Result<ComfyUiMessage, serde_json::Error> {
    let raw: RawMessage = serde_json::from_str(text)?;
    let message = match raw.kind.as_str() {
        "execution_start" => ComfyUiMessage::ExecutionStart(data(raw.data)?),
        "executing" => ComfyUiMessage::Executing(data(raw.data)?),
        "progress" => ComfyUiMessage::Progress(data(raw.data)?),
        "execution_success" => ComfyUiMessage::ExecutionSuccess(data(raw.data)?),
        "execution_error" => ComfyUiMessage::ExecutionError(data(raw.data)?),
        "execution_interrupted" => ComfyUiMessage::ExecutionInterrupted(data(raw.data)?),
        _ => ComfyUiMessage::Other,
    };
    Ok(message)
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

fn data<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(value)
}
