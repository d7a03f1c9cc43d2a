//! `imgpool-requester` -- interactive client that sends image jobs to
//! the worker pool and saves the results.
//!
//! # Environment variables
//!
//! See [`RequesterConfig::from_env`]; the most common ones:
//!
//! | Variable        | Required | Default                 | Description               |
//! |-----------------|----------|-------------------------|---------------------------|
//! | `BUS_URL`       | no       | `nats://localhost:4223` | NATS server to connect to |
//! | `DISPATCH_MODE` | no       | `solicit`               | `solicit` or `direct`     |
//! | `SELECTION`     | no       | `queue-group`           | `queue-group`/`broadcast` |
//! | `OUTPUT_DIR`    | no       | `.`                     | Where images are saved    |

use std::sync::Arc;

use anyhow::Context;
use imgpool_bus::{MessageBus, NatsBus};
use imgpool_requester::output::ImageSaver;
use imgpool_requester::prompt::Prompter;
use imgpool_requester::{Coordinator, RequesterConfig, Session};
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imgpool_requester=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = RequesterConfig::from_env().context("Failed to load requester configuration")?;

    let bus = NatsBus::connect(&config.bus_url)
        .await
        .with_context(|| format!("Failed to connect to bus at {}", config.bus_url))?;

    let coordinator = Coordinator::new(Arc::new(bus.clone()), config.dispatch.clone());
    let prompter = Prompter::new(BufReader::new(tokio::io::stdin()), std::io::stdout());
    let mut session = Session::new(
        coordinator,
        prompter,
        ImageSaver::new(&config.output_dir),
        config.defaults,
    );

    session.run().await.context("Session failed")?;

    bus.drain().await.context("Failed to drain bus connection")?;
    Ok(())
}
