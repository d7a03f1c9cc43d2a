use std::str::FromStr;
use std::time::Duration;

use imgpool_comfyui::ComfyUiConfig;
use imgpool_core::WorkerId;

/// Default NATS URL shared by workers and requesters.
pub const DEFAULT_BUS_URL: &str = "nats://localhost:4223";

/// Default ComfyUI HTTP endpoint.
pub const DEFAULT_COMFYUI_API_URL: &str = "http://localhost:8188";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Image generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    Synthetic,
    ComfyUi,
}

impl FromStr for GeneratorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synthetic" => Ok(Self::Synthetic),
            "comfyui" => Ok(Self::ComfyUi),
            other => Err(format!("expected 'synthetic' or 'comfyui', got '{other}'")),
        }
    }
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub bus_url: String,
    pub worker_id: WorkerId,
    pub generator: GeneratorKind,
    pub synthetic_step_delay: Duration,
    pub comfyui: ComfyUiConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                        |
    /// |---------------------------|--------------------------------|
    /// | `BUS_URL`                 | `nats://localhost:4223`        |
    /// | `WORKER_ID`               | random                         |
    /// | `GENERATOR`               | `synthetic`                    |
    /// | `SYNTHETIC_STEP_DELAY_MS` | `250`                          |
    /// | `COMFYUI_API_URL`         | `http://localhost:8188`        |
    /// | `COMFYUI_WS_URL`          | derived from `COMFYUI_API_URL` |
    /// | `COMFYUI_CHECKPOINT`      | `sd_xl_base_1.0.safetensors`   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bus_url = lookup("BUS_URL").unwrap_or_else(|| DEFAULT_BUS_URL.into());

        let worker_id = match lookup("WORKER_ID").filter(|s| !s.trim().is_empty()) {
            Some(raw) => WorkerId::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
                var: "WORKER_ID",
                reason: e.to_string(),
            })?,
            None => WorkerId::generate(),
        };

        let generator = lookup("GENERATOR")
            .unwrap_or_else(|| "synthetic".into())
            .parse()
            .map_err(|reason| ConfigError::Invalid {
                var: "GENERATOR",
                reason,
            })?;

        let step_delay_ms: u64 = lookup("SYNTHETIC_STEP_DELAY_MS")
            .unwrap_or_else(|| "250".into())
            .trim()
            .parse()
            .map_err(|e| ConfigError::Invalid {
                var: "SYNTHETIC_STEP_DELAY_MS",
                reason: format!("{e}"),
            })?;

        let mut comfyui = ComfyUiConfig::new(
            lookup("COMFYUI_API_URL").unwrap_or_else(|| DEFAULT_COMFYUI_API_URL.into()),
        );
        if let Some(ws_url) = lookup("COMFYUI_WS_URL").filter(|s| !s.trim().is_empty()) {
            comfyui.ws_url = ws_url.trim().trim_end_matches('/').to_string();
        }
        if let Some(checkpoint) = lookup("COMFYUI_CHECKPOINT").filter(|s| !s.trim().is_empty()) {
            comfyui.sampler.checkpoint = checkpoint;
        }

        Ok(Self {
            bus_url,
            worker_id,
            generator,
            synthetic_step_delay: Duration::from_millis(step_delay_ms),
            comfyui,
        })
    }
}
