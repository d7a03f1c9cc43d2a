//! Requester side of imgpool: finds a willing worker, hands it a job and
//! waits for the single terminal result, surfacing assignment and
//! progress notifications along the way.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod output;
pub mod prompt;
pub mod session;

pub use config::{ConfigError, RequesterConfig};
pub use coordinator::{Coordinator, DispatchMode, DispatchOptions, Notification, SelectionStrategy};
pub use error::{DispatchError, SessionError};
pub use session::{JobDefaults, Session};
