//! In-process bus backed by per-subscription `tokio::sync::mpsc` channels.
//!
//! [`InMemoryBus`] is used when workers and requesters share a process
//! and in tests. Clones share the same routing table. Routing is
//! synchronous, so messages land in their subscriptions' channels in
//! publish order, across subscriptions as well as within one.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::bus::MessageBus;
use crate::error::BusError;
use crate::message::{Message, SubscribeOptions};
use crate::subject::{matches, validate_pattern, validate_subject};
use crate::subscription::{Subscription, Unsubscribe};

/// In-process publish/subscribe router.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    router: Arc<Router>,
}

#[derive(Default)]
struct Router {
    state: Mutex<RouterState>,
}

#[derive(Default)]
struct RouterState {
    closed: bool,
    next_sid: u64,
    /// Ordered by sid so queue-group rotation is deterministic.
    entries: BTreeMap<u64, Entry>,
    /// Round-robin cursor per `(pattern, queue group)`.
    cursors: HashMap<(String, String), usize>,
}

struct Entry {
    pattern: String,
    queue_group: Option<String>,
    tx: mpsc::UnboundedSender<Message>,
    remaining: Option<u64>,
}

impl Router {
    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Unsubscribe for Router {
    fn unsubscribe(&self, sid: u64) {
        self.lock().entries.remove(&sid);
    }
}

impl RouterState {
    /// Route one message; returns how many subscribers received it.
    fn route(&mut self, message: &Message) -> usize {
        let mut plain = Vec::new();
        let mut groups: BTreeMap<(String, String), Vec<u64>> = BTreeMap::new();

        for (sid, entry) in &self.entries {
            if !matches(&entry.pattern, &message.subject) {
                continue;
            }
            match &entry.queue_group {
                Some(group) => groups
                    .entry((entry.pattern.clone(), group.clone()))
                    .or_default()
                    .push(*sid),
                None => plain.push(*sid),
            }
        }

        let mut delivered = 0;
        for sid in plain {
            if self.deliver(sid, message) {
                delivered += 1;
            }
        }

        for (key, members) in groups {
            let start = self.cursors.get(&key).copied().unwrap_or(0);
            // Try members in rotation until one accepts the message.
            for offset in 0..members.len() {
                let index = (start + offset) % members.len();
                if self.deliver(members[index], message) {
                    self.cursors.insert(key.clone(), index + 1);
                    delivered += 1;
                    break;
                }
            }
        }

        let entries = &self.entries;
        self.cursors.retain(|(pattern, group), _| {
            entries
                .values()
                .any(|e| &e.pattern == pattern && e.queue_group.as_ref() == Some(group))
        });

        delivered
    }

    /// Hand a message to one subscription, retiring it when its limit is
    /// reached or its receiver is gone.
    fn deliver(&mut self, sid: u64, message: &Message) -> bool {
        let Some(entry) = self.entries.get_mut(&sid) else {
            return false;
        };
        if entry.tx.send(message.clone()).is_err() {
            self.entries.remove(&sid);
            return false;
        }
        if let Some(remaining) = entry.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.entries.remove(&sid);
            }
        }
        true
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.router.lock().entries.len()
    }

    /// Publish synchronously; returns how many subscribers received it.
    pub fn publish_now(&self, message: Message) -> Result<usize, BusError> {
        validate_subject(&message.subject)?;
        let mut state = self.router.lock();
        if state.closed {
            return Err(BusError::Closed);
        }
        let delivered = state.route(&message);
        tracing::trace!(subject = %message.subject, delivered, "Routed message");
        Ok(delivered)
    }

    fn subscribe_now(
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

        let (tx, rx) = mpsc::unbounded_channel();
        let sid = {
            let mut state = self.router.lock();
            if state.closed {
                return Err(BusError::Closed);
            }
            state.next_sid += 1;
            let sid = state.next_sid;
            state.entries.insert(
                sid,
                Entry {
                    pattern: subject.to_string(),
                    queue_group: options.queue_group,
                    tx,
                    remaining: options.max_messages,
                },
            );
            sid
        };

        let registration: Arc<dyn Unsubscribe> = self.router.clone();
        Ok(Subscription::new(sid, subject, rx, registration))
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        self.publish_now(message).map(|_| ())
    }

    async fn subscribe(
        &self,
        subject: &str,
        options: SubscribeOptions,
    ) -> Result<Subscription, BusError> {
        self.subscribe_now(subject, options)
    }

    async fn flush(&self) -> Result<(), BusError> {
        // Routing is synchronous; nothing is ever in flight.
        if self.router.lock().closed {
            return Err(BusError::Closed);
        }
        Ok(())
    }

    async fn drain(&self) -> Result<(), BusError> {
        let mut state = self.router.lock();
        state.closed = true;
        state.entries.clear();
        state.cursors.clear();
        tracing::debug!("In-memory bus drained");
        Ok(())
    }
}
