//! Messaging bus boundary for imgpool.
//!
//! This crate provides:
//!
//! - [`MessageBus`] -- the publish/subscribe contract the worker and
//!   requester are written against.
//! - [`InMemoryBus`] -- an in-process router with queue groups and
//!   bounded subscriptions, shared via cheap clones.
//! - [`NatsBus`] -- the production transport, a NATS connection via
//!   `async-nats`.
//! - [`request`] -- one-shot request/reply over a fresh inbox.

pub mod bus;
pub mod error;
pub mod memory;
pub mod message;
pub mod nats;
pub mod request;
pub mod subject;
pub mod subscription;

pub use bus::{new_inbox, MessageBus, INBOX_PREFIX};
pub use error::BusError;
pub use memory::InMemoryBus;
pub use message::{Headers, Message, SubscribeOptions};
pub use nats::NatsBus;
pub use request::request;
pub use subscription::Subscription;
