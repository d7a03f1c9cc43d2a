//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission, interruption, history retrieval and
//! output download using [`reqwest`].

use serde::Deserialize;

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUiApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: i32,
}

/// Location of an output file as reported in the prompt history.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(default = "default_output_type", rename = "type")]
    pub kind: String,
}

fn default_output_type() -> String {
    "output".to_string()
}

/// Downloaded output bytes plus the content type the server reported.
#[derive(Debug)]
pub struct DownloadedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUiApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ComfyUiApi {
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Queue a workflow via `POST /prompt`, tagging it with `client_id`
    /// so execution messages are routed to our WebSocket.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUiApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Interrupt whatever is executing right now (`POST /interrupt`).
    pub async fn interrupt(&self) -> Result<(), ComfyUiApiError> {
        let response = self
            .client
            .post(format!("{}/interrupt", self.api_url))
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Retrieve execution history for a prompt (`GET /history/{prompt_id}`).
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUiApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download an output file (`GET /view`).
    pub async fn download(&self, image: &OutputImage) -> Result<DownloadedImage, ComfyUiApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", image.filename.as_str()),
                ("subfolder", image.subfolder.as_str()),
                ("type", image.kind.as_str()),
            ])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();

        Ok(DownloadedImage {
            bytes,
            content_type,
        })
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUiApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUiApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUiApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Find the first image output recorded for `prompt_id` in a
/// `/history/{prompt_id}` response.
///
/// Nodes are visited in key order so the choice is stable.
pub fn first_output_image(history: &serde_json::Value, prompt_id: &str) -> Option<OutputImage> {
    let outputs = history.get(prompt_id)?.get("outputs")?.as_object()?;
    let mut node_ids: Vec<&String> = outputs.keys().collect();
    node_ids.sort();

    node_ids.into_iter().find_map(|node_id| {
        outputs[node_id]
            .get("images")?
            .as_array()?
            .iter()
            .find_map(|img| serde_json::from_value::<OutputImage>(img.clone()).ok())
    })
}
