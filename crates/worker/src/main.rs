//! `imgpool-worker` -- a pool member that generates images on request.
//!
//! # Environment variables
//!
//! | Variable                  | Required | Default                 | Description                     |
//! |---------------------------|----------|-------------------------|---------------------------------|
//! | `BUS_URL`                 | no       | `nats://localhost:4223` | NATS server to connect to       |
//! | `WORKER_ID`               | no       | random                  | Identity announced to the pool  |
//! | `GENERATOR`               | no       | `synthetic`             | `synthetic` or `comfyui`        |
//! | `SYNTHETIC_STEP_DELAY_MS` | no       | `250`                   | Delay per synthetic step        |
//! | `COMFYUI_API_URL`         | no       | `http://localhost:8188` | ComfyUI HTTP endpoint           |
//! | `COMFYUI_WS_URL`          | no       | derived                 | ComfyUI WebSocket endpoint      |
//! | `COMFYUI_CHECKPOINT`      | no       | SDXL base               | Checkpoint loaded by workflows  |

use std::sync::Arc;

use anyhow::Context;
use imgpool_bus::{MessageBus, NatsBus};
use imgpool_comfyui::ComfyUiGenerator;
use imgpool_core::ImageGenerator;
use imgpool_worker::{GeneratorKind, SyntheticGenerator, Worker, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imgpool_worker=info,imgpool_comfyui=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().context("Failed to load worker configuration")?;

    let generator: Arc<dyn ImageGenerator> = match config.generator {
        GeneratorKind::Synthetic => Arc::new(SyntheticGenerator::new(config.synthetic_step_delay)),
        GeneratorKind::ComfyUi => {
            tracing::info!(api_url = %config.comfyui.api_url, "Using ComfyUI backend");
            Arc::new(ComfyUiGenerator::new(config.comfyui.clone()))
        }
    };

    let bus = NatsBus::connect(&config.bus_url)
        .await
        .with_context(|| format!("Failed to connect to bus at {}", config.bus_url))?;

    println!("Worker ID: {}", config.worker_id);

    let worker = Worker::new(Arc::new(bus.clone()), config.worker_id.clone(), generator);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, finishing current job");
            shutdown.cancel();
        }
    });

    worker.run(cancel).await.context("Worker failed")?;

    bus.drain().await.context("Failed to drain bus connection")?;
    Ok(())
}
