/// Errors surfaced by bus implementations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The bus has been drained or the connection is gone.
    #[error("Bus connection is closed")]
    Closed,

    /// A subject or subscription pattern is malformed.
    #[error("Invalid subject '{subject}': {reason}")]
    InvalidSubject { subject: String, reason: String },

    /// No reply arrived within the allotted time.
    #[error("Timed out waiting for a reply")]
    Timeout,

    /// Failed to establish a connection to the server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The client library rejected a publish, subscribe or flush.
    #[error("Transport error: {0}")]
    Transport(String),
}
