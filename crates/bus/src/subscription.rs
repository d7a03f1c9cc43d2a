//! Subscription handle returned by [`MessageBus::subscribe`](crate::MessageBus::subscribe).

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::message::Message;

/// Removes a subscription's registration from its bus.
pub trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, sid: u64);
}

/// A live subscription.
///
/// Messages are consumed sequentially with [`next`](Self::next). The
/// subscription ends (returning `None`) once its message limit is
/// reached or the bus closes. Dropping the handle unsubscribes.
pub struct Subscription {
    sid: u64,
    subject: String,
    source: Source,
    registration: Option<Arc<dyn Unsubscribe>>,
}

enum Source {
    /// Fed by the in-memory router.
    Channel(mpsc::UnboundedReceiver<Message>),
    /// Read straight from a client library's subscriber, so messages
    /// keep the order the connection received them in.
    Stream(BoxStream<'static, Message>),
}

impl Subscription {
    pub fn new(
        sid: u64,
        subject: impl Into<String>,
        rx: mpsc::UnboundedReceiver<Message>,
        registration: Arc<dyn Unsubscribe>,
    ) -> Self {
        Self {
            sid,
            subject: subject.into(),
            source: Source::Channel(rx),
            registration: Some(registration),
        }
    }

    /// Wrap a stream that unsubscribes by itself when dropped.
    pub fn from_stream(
        sid: u64,
        subject: impl Into<String>,
        messages: BoxStream<'static, Message>,
    ) -> Self {
        Self {
            sid,
            subject: subject.into(),
            source: Source::Stream(messages),
            registration: None,
        }
    }

    pub fn sid(&self) -> u64 {
        self.sid
    }

    /// The subject or pattern this subscription was registered with.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Wait for the next message.
    pub async fn next(&mut self) -> Option<Message> {
        match &mut self.source {
            Source::Channel(rx) => rx.recv().await,
            Source::Stream(messages) => messages.next().await,
        }
    }

    /// Remove interest in the subject.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.unsubscribe(self.sid);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("sid", &self.sid)
            .field("subject", &self.subject)
            .finish()
    }
}
