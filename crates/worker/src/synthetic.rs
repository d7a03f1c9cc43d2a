//! Built-in generator that renders deterministic PNGs without a GPU.
//!
//! The picture is a function of `(prompt, seed, width, height)` only, so
//! identical requests produce identical bytes. Each of the request's
//! steps waits `step_delay` and reports progress, which makes the
//! generator a stand-in for a real diffusion backend in local runs and
//! tests.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use imgpool_core::{
    GeneratedImage, GenerationError, ImageGenerator, JobRequest, ProgressReporter, ProgressUpdate,
};
use sha2::{Digest, Sha256};

/// Largest width or height the synthetic renderer accepts.
pub const MAX_SYNTHETIC_DIMENSION: u32 = 4096;

const PNG_MIMETYPE: &str = "image/png";

#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    step_delay: Duration,
}

impl SyntheticGenerator {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

impl Default for SyntheticGenerator {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

#[async_trait]
impl ImageGenerator for SyntheticGenerator {
    async fn generate(
        &self,
        request: &JobRequest,
        progress: ProgressReporter,
    ) -> Result<GeneratedImage, GenerationError> {
        if request.width > MAX_SYNTHETIC_DIMENSION || request.height > MAX_SYNTHETIC_DIMENSION {
            return Err(GenerationError::InvalidRequest(format!(
                "Synthetic images are limited to {MAX_SYNTHETIC_DIMENSION}x{MAX_SYNTHETIC_DIMENSION} pixels"
            )));
        }

        let seed = request.seed.unwrap_or_else(rand::random);
        for step in 1..=request.num_steps {
            tokio::time::sleep(self.step_delay).await;
            progress.report(ProgressUpdate::from_steps(step, request.num_steps).percent());
        }

        let palette = palette(&request.prompt, seed);
        let (width, height) = (request.width, request.height);
        let bytes = tokio::task::spawn_blocking(move || render_png(&palette, width, height))
            .await
            .map_err(|e| GenerationError::Failed(format!("Renderer task failed: {e}")))??;

        Ok(GeneratedImage {
            bytes,
            mimetype: PNG_MIMETYPE.to_string(),
        })
    }
}

/// 32 bytes of colour material derived from the prompt and seed.
fn palette(prompt: &str, seed: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_le_bytes());
    hasher.finalize().into()
}

fn render_png(palette: &[u8; 32], width: u32, height: u32) -> Result<Vec<u8>, GenerationError> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        let fx = (x * 255 / width.max(1)) as u8;
        let fy = (y * 255 / height.max(1)) as u8;
        let cell = palette[((x / 8 + y / 8) % 32) as usize];
        Rgb([palette[0] ^ fx, palette[1] ^ fy, palette[2].wrapping_add(cell / 4)])
    });

    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| GenerationError::Failed(format!("PNG encoding failed: {e}")))?;
    Ok(bytes)
}
