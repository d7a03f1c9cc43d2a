//! The publish/subscribe contract.

use async_trait::async_trait;

use crate::error::BusError;
use crate::message::{Message, SubscribeOptions};
use crate::subscription::Subscription;

/// Prefix of every generated inbox subject.
pub const INBOX_PREFIX: &str = "_INBOX";

/// Generate a fresh, unique inbox subject.
pub fn new_inbox() -> String {
    format!("{INBOX_PREFIX}.{}", uuid::Uuid::new_v4().simple())
}

/// Best-effort publish/subscribe transport.
///
/// Delivery is at most once per subscriber with no ordering guarantee
/// across publishers. Messages published to a subject with queue-group
/// subscribers reach exactly one member of each group.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a message to its subject.
    async fn publish(&self, message: Message) -> Result<(), BusError>;

    /// Register interest in a subject or wildcard pattern.
    async fn subscribe(
        &self,
        subject: &str,
        options: SubscribeOptions,
    ) -> Result<Subscription, BusError>;

    /// Generate a unique subject for correlating replies.
    fn new_inbox(&self) -> String {
        new_inbox()
    }

    /// Wait until previously published messages have been routed.
    async fn flush(&self) -> Result<(), BusError>;

    /// Flush, end every subscription and close the connection.
    async fn drain(&self) -> Result<(), BusError>;
}
