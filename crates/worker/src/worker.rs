//! Worker runtime: the solicitation responder and the job loop.
//!
//! The two loops run concurrently so a busy worker still declines new
//! solicitations promptly. Job execution is spawned off the job loop;
//! the [`WorkerSession`] guarantees at most one runs at a time.

use std::sync::Arc;

use imgpool_bus::{Message, MessageBus, SubscribeOptions, Subscription};
use imgpool_core::protocol::{
    worker_job_subject, HEADER_IMAGE_INBOX, JOB_SUBJECT, QUEUE_GROUP, SOLICIT_BROADCAST_SUBJECT,
    SOLICIT_SUBJECT,
};
use imgpool_core::{
    AssignmentNotice, CorrelationSubjects, ImageGenerator, JobRequest, ProgressReporter,
    ResultEnvelope, WorkerId,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::state::{JobGuard, WorkerSession};

/// A capacity-1 pool member.
pub struct Worker {
    bus: Arc<dyn MessageBus>,
    session: Arc<WorkerSession>,
    generator: Arc<dyn ImageGenerator>,
}

impl Worker {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        id: WorkerId,
        generator: Arc<dyn ImageGenerator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            session: WorkerSession::new(id),
            generator,
        })
    }

    pub fn id(&self) -> &WorkerId {
        self.session.id()
    }

    pub fn session(&self) -> &Arc<WorkerSession> {
        &self.session
    }

    /// Subscribe to the pool subjects and serve until `cancel` fires or
    /// the bus ends the subscriptions.
    ///
    /// Returns once any in-flight job has published its result.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), WorkerError> {
        let (solicitations, broadcasts, private_jobs, pool_jobs) = self.subscribe().await?;
        tracing::info!(worker_id = %self.id(), "Worker ready");

        tokio::join!(
            Arc::clone(&self).respond_loop(solicitations, broadcasts, cancel.clone()),
            Arc::clone(&self).job_loop(private_jobs, pool_jobs, cancel),
        );

        tracing::info!(worker_id = %self.id(), "Worker stopped");
        Ok(())
    }

    async fn subscribe(
        &self,
    ) -> Result<(Subscription, Subscription, Subscription, Subscription), WorkerError> {
        let solicitations = self
            .bus
            .subscribe(SOLICIT_SUBJECT, SubscribeOptions::default().queue(QUEUE_GROUP))
            .await?;
        let broadcasts = self
            .bus
            .subscribe(SOLICIT_BROADCAST_SUBJECT, SubscribeOptions::default())
            .await?;
        let private_jobs = self
            .bus
            .subscribe(&worker_job_subject(self.id()), SubscribeOptions::default())
            .await?;
        let pool_jobs = self
            .bus
            .subscribe(JOB_SUBJECT, SubscribeOptions::default().queue(QUEUE_GROUP))
            .await?;
        self.bus.flush().await?;
        Ok((solicitations, broadcasts, private_jobs, pool_jobs))
    }

    // -----------------------------------------------------------------------
    // Solicitations
    // -----------------------------------------------------------------------

    async fn respond_loop(
        self: Arc<Self>,
        mut solicitations: Subscription,
        mut broadcasts: Subscription,
        cancel: CancellationToken,
    ) {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = solicitations.next() => msg,
                msg = broadcasts.next() => msg,
            };
            match message {
                Some(msg) => self.respond_to_solicitation(msg).await,
                None => break,
            }
        }
    }

    /// Reply with this worker's willingness, read at this instant.
    ///
    /// The reply's own reply subject is the worker's private job subject.
    pub async fn respond_to_solicitation(&self, message: Message) {
        let Some(reply) = message.reply else {
            tracing::warn!(worker_id = %self.id(), subject = %message.subject, "Solicitation without reply subject ignored");
            return;
        };

        let willingness = self.session.willingness();
        tracing::debug!(worker_id = %self.id(), accepts = willingness.accepts, "Answering solicitation");
        let (headers, payload) = willingness.encode();
        let answer = Message::new(reply, payload)
            .with_headers(headers)
            .with_reply(worker_job_subject(self.id()));
        if let Err(e) = self.bus.publish(answer).await {
            tracing::warn!(worker_id = %self.id(), error = %e, "Failed to answer solicitation");
        }
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    async fn job_loop(
        self: Arc<Self>,
        mut private_jobs: Subscription,
        mut pool_jobs: Subscription,
        cancel: CancellationToken,
    ) {
        let mut running = JoinSet::new();
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                Some(_) = running.join_next(), if !running.is_empty() => continue,
                msg = private_jobs.next() => msg,
                msg = pool_jobs.next() => msg,
            };
            match message {
                Some(msg) => self.handle_job(msg, &mut running).await,
                None => break,
            }
        }

        // Stop taking jobs, then let the current one publish its result.
        drop(private_jobs);
        drop(pool_jobs);
        while running.join_next().await.is_some() {}
    }

    /// Accept or reject one job payload.
    ///
    /// An accepted job publishes its assignment notice immediately and is
    /// executed on `running`. A job arriving while busy gets an immediate
    /// failure result and does not disturb the running job.
    pub async fn handle_job(self: &Arc<Self>, message: Message, running: &mut JoinSet<()>) {
        let Some(inbox) = message
            .header(HEADER_IMAGE_INBOX)
            .map(str::to_string)
            .or_else(|| message.reply.clone())
        else {
            tracing::warn!(worker_id = %self.id(), subject = %message.subject, "Job without correlation inbox dropped");
            return;
        };
        let subjects = CorrelationSubjects::from_inbox(&inbox);

        let guard = match self.session.try_begin(&inbox) {
            Ok(guard) => guard,
            Err(e) => {
                self.publish_result(&subjects, ResultEnvelope::failure(e.to_string()))
                    .await;
                return;
            }
        };

        let notice = AssignmentNotice {
            worker_id: self.id().clone(),
        };
        let (headers, payload) = notice.encode();
        if let Err(e) = self
            .bus
            .publish(Message::new(subjects.assignment.clone(), payload).with_headers(headers))
            .await
        {
            tracing::warn!(worker_id = %self.id(), inbox = %inbox, error = %e, "Failed to publish assignment");
        }

        let worker = Arc::clone(self);
        running.spawn(async move { worker.execute(message.payload, subjects, guard).await });
    }

    async fn execute(&self, payload: Vec<u8>, subjects: CorrelationSubjects, guard: JobGuard) {
        let envelope = match JobRequest::decode(&payload) {
            Ok(request) => self.generate(request, &subjects.progress).await,
            Err(e) => {
                tracing::warn!(worker_id = %self.id(), inbox = %guard.inbox(), error = %e, "Undecodable job payload");
                ResultEnvelope::failure(e.to_string())
            }
        };
        self.publish_result(&subjects, envelope).await;
        drop(guard);
    }

    /// Run the generator, forwarding its progress to `progress_subject`.
    ///
    /// Every update reported before the generator returns is published
    /// before this returns.
    async fn generate(&self, request: JobRequest, progress_subject: &str) -> ResultEnvelope {
        let (reporter, mut updates) = ProgressReporter::channel();

        let bus = Arc::clone(&self.bus);
        let subject = progress_subject.to_string();
        let forwarder = tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                if let Err(e) = bus.publish(Message::new(subject.clone(), update.encode())).await {
                    tracing::debug!(error = %e, "Dropped progress update");
                }
            }
        });

        tracing::info!(
            worker_id = %self.id(),
            prompt = %request.prompt,
            width = request.width,
            height = request.height,
            steps = request.num_steps,
            "Generating image",
        );

        // A panicking generator only takes its own task down.
        let generator = Arc::clone(&self.generator);
        let outcome =
            tokio::spawn(async move { generator.generate(&request, reporter).await }).await;
        let _ = forwarder.await;

        match outcome {
            Ok(Ok(image)) => {
                tracing::info!(worker_id = %self.id(), bytes = image.bytes.len(), "Generation succeeded");
                ResultEnvelope::success(image.bytes, image.mimetype)
            }
            Ok(Err(e)) => {
                tracing::warn!(worker_id = %self.id(), error = %e, "Generation failed");
                ResultEnvelope::failure(e.to_string())
            }
            Err(e) => {
                tracing::error!(worker_id = %self.id(), error = %e, "Generation task aborted");
                ResultEnvelope::failure(format!("Generation aborted: {e}"))
            }
        }
    }

    async fn publish_result(&self, subjects: &CorrelationSubjects, envelope: ResultEnvelope) {
        let success = envelope.is_success();
        let (headers, payload) = envelope.encode();
        let message = Message::new(subjects.result.clone(), payload).with_headers(headers);
        if let Err(e) = self.bus.publish(message).await {
            tracing::warn!(worker_id = %self.id(), inbox = %subjects.inbox(), error = %e, "Failed to publish result");
            return;
        }
        if let Err(e) = self.bus.flush().await {
            tracing::warn!(worker_id = %self.id(), error = %e, "Failed to flush result");
        }
        tracing::info!(worker_id = %self.id(), inbox = %subjects.inbox(), success, "Result published");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use imgpool_bus::InMemoryBus;
    use imgpool_core::subjects;

    use super::*;
    use crate::synthetic::SyntheticGenerator;

    fn worker(bus: &InMemoryBus) -> Arc<Worker> {
        Worker::new(
            Arc::new(bus.clone()),
            WorkerId::new("w1"),
            Arc::new(SyntheticGenerator::new(Duration::ZERO)),
        )
    }

    #[tokio::test]
    async fn solicitation_reply_carries_private_subject() {
        let bus = InMemoryBus::new();
        let w = worker(&bus);
        let mut replies = bus.subscribe("_INBOX.r", SubscribeOptions::default()).await.unwrap();

        w.respond_to_solicitation(Message::new(SOLICIT_SUBJECT, Vec::<u8>::new()).with_reply("_INBOX.r"))
            .await;

        let reply = replies.next().await.unwrap();
        assert_eq!(reply.header("accepts"), Some("true"));
        assert_eq!(reply.header("worker-id"), Some("w1"));
        assert_eq!(reply.reply.as_deref(), Some("workers.w1.jobs"));
    }

    #[tokio::test]
    async fn job_without_inbox_is_dropped() {
        let bus = InMemoryBus::new();
        let w = worker(&bus);
        let mut running = JoinSet::new();

        w.handle_job(Message::new(JOB_SUBJECT, b"{}".to_vec()), &mut running).await;

        assert!(running.is_empty());
        assert!(w.session().willingness().accepts);
    }

    #[tokio::test]
    async fn undecodable_payload_yields_failure_and_idle() {
        let bus = InMemoryBus::new();
        let w = worker(&bus);
        let inbox = bus.new_inbox();
        let mut result = bus
            .subscribe(&subjects::result(&inbox), SubscribeOptions::default())
            .await
            .unwrap();
        let mut running = JoinSet::new();

        let job = Message::new(worker_job_subject(w.id()), b"not json".to_vec())
            .with_header(HEADER_IMAGE_INBOX, inbox.clone());
        w.handle_job(job, &mut running).await;
        while running.join_next().await.is_some() {}

        let msg = result.next().await.unwrap();
        assert_eq!(msg.header("success"), Some("false"));
        assert!(String::from_utf8_lossy(&msg.payload).contains("Invalid job payload"));
        assert!(w.session().willingness().accepts);
    }
}
