//! Worker pool coordinator.
//!
//! [`Coordinator::dispatch`] runs one job end to end:
//!
//! 1. Generate an inbox `I` and subscribe to `I`, `I.worker-assigned`
//!    and `I.worker-progress` before anything is sent.
//! 2. Pick a target. In [`DispatchMode::Solicit`] the coordinator asks
//!    the pool for a willing worker and addresses its private subject;
//!    in [`DispatchMode::Direct`] the job goes to the pool subject and
//!    the receiving worker runs or rejects it.
//! 3. Publish the job with `I` in the `imageInbox` header and as reply.
//! 4. Wait for the result, reporting assignment and progress as they
//!    arrive, then unsubscribe everything.
//!
//! Choosing a worker is a single decision: the first acceptable reply
//! wins and no later reply is read. A job is never re-sent once handed
//! to a worker.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use imgpool_bus::{request, BusError, Message, MessageBus, SubscribeOptions, Subscription};
use imgpool_core::protocol::{
    worker_job_subject, HEADER_IMAGE_INBOX, JOB_SUBJECT, SOLICIT_BROADCAST_SUBJECT,
    SOLICIT_SUBJECT,
};
use imgpool_core::{
    AssignmentNotice, CorrelationSubjects, JobRequest, ProgressUpdate, ResultEnvelope,
    Willingness, WorkerId,
};
use tokio::time::Instant;

use crate::error::DispatchError;

/// How the job reaches a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Solicit a willing worker first, then address it privately.
    Solicit,
    /// Publish straight to the pool's queue group.
    Direct,
}

/// How a solicitation reaches the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// One pool member answers per attempt, chosen by the bus.
    QueueGroup,
    /// Every member answers; the first willing reply wins.
    Broadcast,
}

/// Events surfaced while waiting for a result.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Assigned(WorkerId),
    Progress(ProgressUpdate),
}

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub mode: DispatchMode,
    pub selection: SelectionStrategy,
    /// Wait per solicitation attempt.
    pub solicit_timeout: Duration,
    pub max_solicit_attempts: u32,
    /// `None` waits for the result indefinitely.
    pub result_timeout: Option<Duration>,
    /// Soft cap on progress messages read per job.
    pub progress_max_messages: u64,
    /// Workers whose willing replies are ignored.
    pub blacklist: HashSet<WorkerId>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Solicit,
            selection: SelectionStrategy::QueueGroup,
            solicit_timeout: Duration::from_secs(1),
            max_solicit_attempts: 10,
            result_timeout: Some(Duration::from_secs(600)),
            progress_max_messages: 100,
            blacklist: HashSet::new(),
        }
    }
}

pub struct Coordinator {
    bus: Arc<dyn MessageBus>,
    options: DispatchOptions,
}

impl Coordinator {
    pub fn new(bus: Arc<dyn MessageBus>, options: DispatchOptions) -> Self {
        Self { bus, options }
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Run one job and return its terminal result.
    ///
    /// `notify` sees every assignment and progress message that arrives
    /// before the result.
    pub async fn dispatch(
        &self,
        job: &JobRequest,
        mut notify: impl FnMut(Notification),
    ) -> Result<ResultEnvelope, DispatchError> {
        job.validate().map_err(DispatchError::InvalidRequest)?;
        let payload = job.encode().map_err(DispatchError::InvalidRequest)?;

        let subjects = CorrelationSubjects::from_inbox(&self.bus.new_inbox());
        let mut result = self
            .bus
            .subscribe(&subjects.result, SubscribeOptions::default().max_messages(1))
            .await?;
        let mut assignment = self
            .bus
            .subscribe(&subjects.assignment, SubscribeOptions::default().max_messages(1))
            .await?;
        let mut progress = self
            .bus
            .subscribe(
                &subjects.progress,
                SubscribeOptions::default().max_messages(self.options.progress_max_messages),
            )
            .await?;

        let target = match self.options.mode {
            DispatchMode::Direct => JOB_SUBJECT.to_string(),
            DispatchMode::Solicit => worker_job_subject(&self.acquire_worker().await?),
        };

        tracing::info!(inbox = %subjects.inbox(), target = %target, "Dispatching job");
        self.bus
            .publish(
                Message::new(target, payload)
                    .with_header(HEADER_IMAGE_INBOX, subjects.inbox())
                    .with_reply(subjects.inbox()),
            )
            .await?;
        self.bus.flush().await?;

        let wait = wait_for_result(&mut result, &mut assignment, &mut progress, &mut notify);
        let outcome = match self.options.result_timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| DispatchError::ResultTimeout(limit))
                .and_then(|r| r),
            None => wait.await,
        };

        result.unsubscribe();
        assignment.unsubscribe();
        progress.unsubscribe();

        if let Ok(envelope) = &outcome {
            tracing::info!(inbox = %subjects.inbox(), success = envelope.is_success(), "Job finished");
        }
        outcome
    }

    // -----------------------------------------------------------------------
    // Worker acquisition
    // -----------------------------------------------------------------------

    /// Solicit until a willing, trusted worker answers or the attempts
    /// run out.
    pub async fn acquire_worker(&self) -> Result<WorkerId, DispatchError> {
        let attempts = self.options.max_solicit_attempts;
        for attempt in 1..=attempts {
            let chosen = match self.options.selection {
                SelectionStrategy::QueueGroup => self.solicit_one().await?,
                SelectionStrategy::Broadcast => self.solicit_all().await?,
            };
            if let Some(worker_id) = chosen {
                tracing::info!(worker_id = %worker_id, attempt, "Acquired worker");
                return Ok(worker_id);
            }
            tracing::debug!(attempt, "No willing worker yet");
        }
        Err(DispatchError::NoWillingWorker { attempts })
    }

    async fn solicit_one(&self) -> Result<Option<WorkerId>, DispatchError> {
        let message = Message::new(SOLICIT_SUBJECT, Vec::<u8>::new());
        match request(&*self.bus, message, self.options.solicit_timeout).await {
            Ok(reply) => Ok(self.usable_worker(&reply)),
            Err(BusError::Timeout) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn solicit_all(&self) -> Result<Option<WorkerId>, DispatchError> {
        let inbox = self.bus.new_inbox();
        let mut replies = self.bus.subscribe(&inbox, SubscribeOptions::default()).await?;
        self.bus
            .publish(Message::new(SOLICIT_BROADCAST_SUBJECT, Vec::<u8>::new()).with_reply(inbox))
            .await?;

        let deadline = Instant::now() + self.options.solicit_timeout;
        loop {
            match tokio::time::timeout_at(deadline, replies.next()).await {
                Ok(Some(reply)) => {
                    if let Some(worker_id) = self.usable_worker(&reply) {
                        // Later replies are never read.
                        replies.unsubscribe();
                        return Ok(Some(worker_id));
                    }
                }
                Ok(None) => return Err(BusError::Closed.into()),
                Err(_) => return Ok(None),
            }
        }
    }

    /// The replying worker, if it is willing, trusted and addressable.
    fn usable_worker(&self, reply: &Message) -> Option<WorkerId> {
        let willingness = match Willingness::decode(&reply.headers, &reply.payload) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed willingness reply");
                return None;
            }
        };
        if !willingness.accepts {
            tracing::debug!(worker_id = %willingness.worker_id, "Worker declined");
            return None;
        }
        if self.options.blacklist.contains(&willingness.worker_id) {
            tracing::warn!(worker_id = %willingness.worker_id, "Skipping blacklisted worker");
            return None;
        }
        match WorkerId::parse(willingness.worker_id.as_str()) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(worker_id = %willingness.worker_id, error = %e, "Worker id is not addressable");
                None
            }
        }
    }
}

async fn wait_for_result(
    result: &mut Subscription,
    assignment: &mut Subscription,
    progress: &mut Subscription,
    notify: &mut impl FnMut(Notification),
) -> Result<ResultEnvelope, DispatchError> {
    let mut assignment_open = true;
    let mut progress_open = true;
    loop {
        // Buffered progress and assignment are surfaced before the result.
        tokio::select! {
            biased;
            msg = progress.next(), if progress_open => match msg {
                Some(msg) => match ProgressUpdate::decode(&msg.payload) {
                    Ok(update) => notify(Notification::Progress(update)),
                    Err(e) => tracing::debug!(error = %e, "Ignoring malformed progress"),
                },
                None => progress_open = false,
            },
            msg = assignment.next(), if assignment_open => match msg {
                Some(msg) => match AssignmentNotice::decode(&msg.headers, &msg.payload) {
                    Ok(notice) => notify(Notification::Assigned(notice.worker_id)),
                    Err(e) => tracing::debug!(error = %e, "Ignoring malformed assignment"),
                },
                None => assignment_open = false,
            },
            msg = result.next() => {
                return match msg {
                    Some(msg) => Ok(ResultEnvelope::decode(&msg.headers, &msg.payload)),
                    None => Err(BusError::Closed.into()),
                };
            }
        }
    }
}
