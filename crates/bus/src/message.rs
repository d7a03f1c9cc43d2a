use std::collections::BTreeMap;

/// Message headers: string keys to string values.
pub type Headers = BTreeMap<String, String>;

/// A message travelling over the bus.
///
/// Constructed via [`Message::new`] and enriched with
/// [`with_reply`](Message::with_reply) and
/// [`with_headers`](Message::with_headers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Concrete subject the message was published to.
    pub subject: String,

    /// Optional subject the receiver should answer on.
    pub reply: Option<String>,

    pub headers: Headers,

    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(subject: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            subject: subject.into(),
            reply: None,
            headers: Headers::new(),
            payload: payload.into(),
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Merge `headers` into the message's headers.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

/// How a subscription should be registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Join this queue group: each message goes to one member only.
    pub queue_group: Option<String>,
    /// End the subscription after this many deliveries.
    pub max_messages: Option<u64>,
}

impl SubscribeOptions {
    pub fn queue(mut self, group: impl Into<String>) -> Self {
        self.queue_group = Some(group.into());
        self
    }

    pub fn max_messages(mut self, max: u64) -> Self {
        self.max_messages = Some(max);
        self
    }
}
