//! [`ImageGenerator`] implementation backed by a ComfyUI server.

use std::time::Duration;

use async_trait::async_trait;
use imgpool_core::{GeneratedImage, GenerationError, ImageGenerator, JobRequest, ProgressReporter};
use tokio_tungstenite::connect_async;

use crate::api::{first_output_image, ComfyUiApi};
use crate::error::ComfyUiError;
use crate::tracker::{track_prompt, PromptOutcome};
use crate::workflow::{text_to_image, SamplerSettings};

/// Mimetype assumed when ComfyUI does not report one.
const FALLBACK_MIMETYPE: &str = "image/png";

/// Connection and sampler settings for a ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUiConfig {
    /// HTTP base URL, e.g. `http://host:8188`.
    pub api_url: String,
    /// WebSocket base URL, e.g. `ws://host:8188`.
    pub ws_url: String,
    pub sampler: SamplerSettings,
    /// Upper bound on a single prompt's execution.
    pub prompt_timeout: Duration,
}

impl ComfyUiConfig {
    /// Settings for `api_url`, deriving the WebSocket URL from it.
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            ws_url: ws_url_for(&api_url),
            api_url,
            sampler: SamplerSettings::default(),
            prompt_timeout: Duration::from_secs(600),
        }
    }
}

/// Map `http(s)://` to `ws(s)://`.
pub fn ws_url_for(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    }
}

/// Generates images by running a text-to-image workflow on ComfyUI.
pub struct ComfyUiGenerator {
    api: ComfyUiApi,
    config: ComfyUiConfig,
}

impl ComfyUiGenerator {
    pub fn new(config: ComfyUiConfig) -> Self {
        Self {
            api: ComfyUiApi::new(config.api_url.clone()),
            config,
        }
    }

    async fn run(
        &self,
        request: &JobRequest,
        progress: &ProgressReporter,
    ) -> Result<GeneratedImage, ComfyUiError> {
        // Connect first so no execution message for our prompt is missed.
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}/ws?clientId={}", self.config.ws_url, client_id);
        let (mut ws_stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
            ComfyUiError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.config.ws_url
            ))
        })?;

        let seed = request.seed.unwrap_or_else(rand::random);
        let workflow = text_to_image(request, seed, &self.config.sampler);
        let submitted = self.api.submit_workflow(&workflow, &client_id).await?;
        let prompt_id = submitted.prompt_id;
        tracing::info!(
            prompt_id = %prompt_id,
            queue_position = submitted.number,
            seed,
            "Workflow submitted to ComfyUI",
        );

        let tracked = tokio::time::timeout(
            self.config.prompt_timeout,
            track_prompt(&mut ws_stream, &prompt_id, progress),
        )
        .await;
        let _ = ws_stream.close(None).await;

        match tracked {
            Ok(Ok(PromptOutcome::Completed)) => {}
            Ok(Ok(PromptOutcome::Failed(message))) => return Err(ComfyUiError::Execution(message)),
            Ok(Ok(PromptOutcome::Interrupted)) => {
                return Err(ComfyUiError::Execution(format!(
                    "Prompt {prompt_id} was interrupted"
                )))
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                if let Err(e) = self.api.interrupt().await {
                    tracing::warn!(prompt_id = %prompt_id, error = %e, "Failed to interrupt timed-out prompt");
                }
                return Err(ComfyUiError::Timeout(prompt_id));
            }
        }

        let history = self.api.get_history(&prompt_id).await?;
        let image = first_output_image(&history, &prompt_id)
            .ok_or_else(|| ComfyUiError::MissingOutput(prompt_id.clone()))?;
        let downloaded = self.api.download(&image).await?;
        progress.report(100.0);

        tracing::info!(
            prompt_id = %prompt_id,
            filename = %image.filename,
            bytes = downloaded.bytes.len(),
            "Downloaded ComfyUI output",
        );

        Ok(GeneratedImage {
            bytes: downloaded.bytes,
            mimetype: downloaded
                .content_type
                .unwrap_or_else(|| FALLBACK_MIMETYPE.to_string()),
        })
    }
}

#[async_trait]
impl ImageGenerator for ComfyUiGenerator {
    async fn generate(
        &self,
        request: &JobRequest,
        progress: ProgressReporter,
    ) -> Result<GeneratedImage, GenerationError> {
        Ok(self.run(request, &progress).await?)
    }
}
