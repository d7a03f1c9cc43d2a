//! [`MessageBus`] over a NATS connection.
//!
//! Each [`Subscription`] reads its `async_nats::Subscriber` directly.
//! The client routes incoming messages to subscribers one at a time in
//! socket order, so a message published after another on the same
//! connection is never delivered ahead of it, even when the two land
//! in different subscriptions. No forwarding task sits in between.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;

use crate::bus::MessageBus;
use crate::error::BusError;
use crate::message::{Headers, Message, SubscribeOptions};
use crate::subject::{validate_pattern, validate_subject};
use crate::subscription::Subscription;

/// A NATS connection, e.g. to `nats://localhost:4223`.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
}

static NEXT_SID: AtomicU64 = AtomicU64::new(1);

impl NatsBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = async_nats::connect(url).await.map_err(|e| {
            BusError::Connection(format!("Failed to connect to NATS at {url}: {e}"))
        })?;
        tracing::info!(url, "Connected to NATS");
        Ok(Self { client })
    }

    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }
}

fn to_nats_headers(headers: &Headers) -> async_nats::HeaderMap {
    let mut map = async_nats::HeaderMap::new();
    for (name, value) in headers {
        map.insert(name.as_str(), value.as_str());
    }
    map
}

fn from_nats(message: async_nats::Message) -> Message {
    let mut headers = Headers::new();
    if let Some(map) = &message.headers {
        for (name, values) in map.iter() {
            if let Some(value) = values.first() {
                headers.insert(name.to_string(), value.as_str().to_string());
            }
        }
    }
    Message {
        subject: message.subject.to_string(),
        reply: message.reply.map(|r| r.to_string()),
        headers,
        payload: message.payload.to_vec(),
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        validate_subject(&message.subject)?;
        let Message {
            subject,
            reply,
            headers,
            payload,
        } = message;

        let result = match (reply, headers.is_empty()) {
            (None, true) => self.client.publish(subject, payload.into()).await,
            (None, false) => {
                self.client
                    .publish_with_headers(subject, to_nats_headers(&headers), payload.into())
                    .await
            }
            (Some(reply), true) => {
                self.client
                    .publish_with_reply(subject, reply, payload.into())
                    .await
            }
            (Some(reply), false) => {
                self.client
                    .publish_with_reply_and_headers(
                        subject,
                        reply,
                        to_nats_headers(&headers),
                        payload.into(),
                    )
                    .await
            }
        };
        result.map_err(|e| BusError::Transport(format!("Publish failed: {e}")))
    }

    async fn subscribe(
        &self,
        subject: &str,
        options: SubscribeOptions,
    ) -> Result<Subscription, BusError> {
        validate_pattern(subject)?;
        if options.max_messages == Some(0) {
            return Err(BusError::InvalidSubject {
                subject: subject.to_string(),
                reason: "max_messages must be at least 1".to_string(),
            });
        }

        let mut subscriber = match options.queue_group {
            Some(group) => self.client.queue_subscribe(subject.to_string(), group).await,
            None => self.client.subscribe(subject.to_string()).await,
        }
        .map_err(|e| BusError::Transport(format!("Subscribe to '{subject}' failed: {e}")))?;

        let sid = NEXT_SID.fetch_add(1, Ordering::Relaxed);
        let messages = match options.max_messages {
            Some(max) => {
                subscriber
                    .unsubscribe_after(max)
                    .await
                    .map_err(|e| BusError::Transport(format!("Unsubscribe-after failed: {e}")))?;
                // The server stops after `max`; the local cap covers
                // messages already in flight when the limit was set.
                subscriber
                    .map(from_nats)
                    .take(usize::try_from(max).unwrap_or(usize::MAX))
                    .boxed()
            }
            None => subscriber.map(from_nats).boxed(),
        };
        Ok(Subscription::from_stream(sid, subject, messages))
    }

    fn new_inbox(&self) -> String {
        self.client.new_inbox()
    }

    async fn flush(&self) -> Result<(), BusError> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Transport(format!("Flush failed: {e}")))
    }

    async fn drain(&self) -> Result<(), BusError> {
        self.client
            .drain()
            .await
            .map_err(|e| BusError::Transport(format!("Drain failed: {e}")))
    }
}
