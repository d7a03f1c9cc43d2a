//! Well-known subject and header names shared by workers and requesters.

use crate::types::WorkerId;

// ---------------------------------------------------------------------------
// Subjects
// ---------------------------------------------------------------------------

/// Queue group every worker joins; the bus load-balances each message
/// published to a queue-group subject onto exactly one member.
pub const QUEUE_GROUP: &str = "workers";

/// Job payloads published straight to the pool (direct dispatch).
pub const JOB_SUBJECT: &str = "img-gen-to-workers";

/// Solicitations answered by a single pool member (queue group).
pub const SOLICIT_SUBJECT: &str = "request-worker";

/// Solicitations answered by every pool member.
pub const SOLICIT_BROADCAST_SUBJECT: &str = "request-worker.all";

/// Private subject on which a single worker accepts job payloads.
pub fn worker_job_subject(worker_id: &WorkerId) -> String {
    format!("workers.{worker_id}.jobs")
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// Correlation inbox carried on job payloads.
pub const HEADER_IMAGE_INBOX: &str = "imageInbox";

/// `true` / `false` on terminal results.
pub const HEADER_SUCCESS: &str = "success";

/// Content type of a successful result payload.
pub const HEADER_MIMETYPE: &str = "mimetype";

/// `true` / `false` on willingness replies.
pub const HEADER_ACCEPTS: &str = "accepts";

/// Identity of the worker sending a willingness reply or assignment notice.
pub const HEADER_WORKER_ID: &str = "worker-id";

/// Mimetype assumed for successful results that do not carry one.
pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// Render a boolean header value.
pub fn bool_header(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

/// Only the literal `true` counts as a set flag.
pub fn parse_bool_header(value: Option<&String>) -> bool {
    value.is_some_and(|v| v == "true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_job_subject_embeds_id() {
        let id = WorkerId::new("abc");
        assert_eq!(worker_job_subject(&id), "workers.abc.jobs");
    }

    #[test]
    fn bool_header_round_trips_only_literal_true() {
        assert!(parse_bool_header(Some(&bool_header(true))));
        assert!(!parse_bool_header(Some(&bool_header(false))));
        assert!(!parse_bool_header(Some(&"TRUE".to_string())));
        assert!(!parse_bool_header(Some(&"1".to_string())));
        assert!(!parse_bool_header(None));
    }
}
