//! Text-to-image workflow template.
//!
//! Builds a ComfyUI API-format graph (checkpoint loader, prompt
//! encoders, empty latent, KSampler, VAE decode, save) from a
//! [`JobRequest`].

use imgpool_core::JobRequest;

/// Node id of the `SaveImage` node whose output is downloaded.
pub const SAVE_NODE_ID: &str = "9";

/// Prefix for files written by the `SaveImage` node.
pub const FILENAME_PREFIX: &str = "imgpool";

/// Sampler settings that are not part of the job request.
#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub checkpoint: String,
    pub cfg: f64,
    pub sampler_name: String,
    pub scheduler: String,
    pub negative_prompt: String,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            checkpoint: "sd_xl_base_1.0.safetensors".to_string(),
            cfg: 7.0,
            sampler_name: "euler".to_string(),
            scheduler: "normal".to_string(),
            negative_prompt: String::new(),
        }
    }
}

/// Build the workflow graph for `request` with an explicit `seed`.
pub fn text_to_image(request: &JobRequest, seed: u64, settings: &SamplerSettings) -> serde_json::Value {
    serde_json::json!({
        "3": {
            "class_type": "KSampler",
            "inputs": {
                "seed": seed,
                "steps": request.num_steps,
                "cfg": settings.cfg,
                "sampler_name": settings.sampler_name,
                "scheduler": settings.scheduler,
                "denoise": 1.0,
                "model": ["4", 0],
                "positive": ["6", 0],
                "negative": ["7", 0],
                "latent_image": ["5", 0]
            }
        },
        "4": {
            "class_type": "CheckpointLoaderSimple",
            "inputs": { "ckpt_name": settings.checkpoint }
        },
        "5": {
            "class_type": "EmptyLatentImage",
            "inputs": {
                "width": request.width,
                "height": request.height,
                "batch_size": 1
            }
        },
        "6": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": request.prompt, "clip": ["4", 1] }
        },
        "7": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": settings.negative_prompt, "clip": ["4", 1] }
        },
        "8": {
            "class_type": "VAEDecode",
            "inputs": { "samples": ["3", 0], "vae": ["4", 2] }
        },
        SAVE_NODE_ID: {
            "class_type": "SaveImage",
            "inputs": { "filename_prefix": FILENAME_PREFIX, "images": ["8", 0] }
        }
    })
}
