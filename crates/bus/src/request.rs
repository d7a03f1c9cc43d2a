//! One-shot request/reply over a fresh inbox.

use std::time::Duration;

use crate::bus::MessageBus;
use crate::error::BusError;
use crate::message::{Message, SubscribeOptions};

/// Publish `message` with a fresh reply inbox and wait for one reply.
///
/// Returns [`BusError::Timeout`] if nothing arrives within `timeout`.
pub async fn request<B>(bus: &B, message: Message, timeout: Duration) -> Result<Message, BusError>
where
    B: MessageBus + ?Sized,
{
    let inbox = bus.new_inbox();
    let mut sub = bus
        .subscribe(&inbox, SubscribeOptions::default().max_messages(1))
        .await?;
    bus.publish(message.with_reply(inbox)).await?;

    match tokio::time::timeout(timeout, sub.next()).await {
        Ok(Some(reply)) => Ok(reply),
        Ok(None) => Err(BusError::Closed),
        Err(_) => Err(BusError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::memory::InMemoryBus;

    #[tokio::test]
    async fn request_receives_reply() {
        let bus = InMemoryBus::new();
        let mut responder = bus.subscribe("echo", SubscribeOptions::default()).await.unwrap();
        let responder_bus = bus.clone();
        tokio::spawn(async move {
            while let Some(msg) = responder.next().await {
                if let Some(reply) = msg.reply {
                    let _ = responder_bus.publish(Message::new(reply, msg.payload)).await;
                }
            }
        });

        let reply = request(&bus, Message::new("echo", b"ping".to_vec()), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply.payload, b"ping");
    }

    #[tokio::test]
    async fn request_without_responder_times_out() {
        let bus = InMemoryBus::new();
        let result = request(&bus, Message::new("nobody", Vec::<u8>::new()), Duration::from_millis(20)).await;
        assert_matches!(result, Err(BusError::Timeout));
        assert_eq!(bus.subscription_count(), 0);
    }
}
