//! The interactive operator loop.

use std::io::Write;

use imgpool_core::{JobRequest, ResultEnvelope};
use tokio::io::AsyncBufRead;

use crate::coordinator::{Coordinator, Notification};
use crate::error::SessionError;
use crate::output::ImageSaver;
use crate::prompt::Prompter;

/// Parameters the operator is not asked for.
#[derive(Debug, Clone, Copy)]
pub struct JobDefaults {
    pub num_steps: u32,
    /// `None` lets the worker pick a random seed.
    pub seed: Option<u64>,
}

/// Prompts for jobs until the operator enters a blank prompt, running
/// each one to completion before asking for the next.
pub struct Session<R, W> {
    coordinator: Coordinator,
    prompter: Prompter<R, W>,
    saver: ImageSaver,
    defaults: JobDefaults,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(
        coordinator: Coordinator,
        prompter: Prompter<R, W>,
        saver: ImageSaver,
        defaults: JobDefaults,
    ) -> Self {
        Self {
            coordinator,
            prompter,
            saver,
            defaults,
        }
    }

    pub fn prompter(&mut self) -> &mut Prompter<R, W> {
        &mut self.prompter
    }

    /// Run until the operator is done. Failed jobs are reported and the
    /// loop continues.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        loop {
            let Some(prompt) = self.prompter.read_prompt().await? else {
                break;
            };
            let Some(width) = self.prompter.read_dimension("width").await? else {
                break;
            };
            let Some(height) = self.prompter.read_dimension("height").await? else {
                break;
            };

            match JobRequest::new(prompt, width, height, self.defaults.num_steps, self.defaults.seed) {
                Ok(job) => self.run_job(&job).await?,
                Err(e) => writeln!(self.prompter.out(), "{e}")?,
            }
        }
        tracing::info!("Session finished");
        Ok(())
    }

    /// Dispatch one job and report its outcome.
    ///
    /// A failed write of a notification does not abort the dispatch; the
    /// first such error is returned once the outcome has been handled.
    async fn run_job(&mut self, job: &JobRequest) -> Result<(), SessionError> {
        let out = self.prompter.out();
        let mut write_error = None;
        let outcome = self
            .coordinator
            .dispatch(job, |notification| {
                let written = match notification {
                    Notification::Assigned(worker_id) => {
                        writeln!(out, "Worker {worker_id} accepted the job")
                    }
                    Notification::Progress(update) => writeln!(out, "Progress: {update}%"),
                };
                if let Err(e) = written {
                    tracing::debug!(error = %e, "Failed to report dispatch notification");
                    write_error.get_or_insert(e);
                }
            })
            .await;

        match outcome {
            Ok(ResultEnvelope::Success { payload, mimetype }) => {
                match self.saver.save(&payload, &mimetype).await {
                    Ok(path) => writeln!(self.prompter.out(), "Image saved to {}", path.display())?,
                    Err(e) => writeln!(self.prompter.out(), "Failed to save image - {e}")?,
                }
            }
            Ok(ResultEnvelope::Failure { reason }) => {
                writeln!(self.prompter.out(), "Image generation failed - {reason}")?
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dispatch failed");
                writeln!(self.prompter.out(), "{e}")?
            }
        }
        match write_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
