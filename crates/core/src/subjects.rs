//! Channel naming scheme for per-job ephemeral subjects.
//!
//! A job is correlated by a single freshly generated inbox `I`. The
//! three subjects used for the job's lifetime are derived from it:
//!
//! | Channel    | Subject                 |
//! |------------|-------------------------|
//! | result     | `I`                     |
//! | assignment | `I.worker-assigned`     |
//! | progress   | `I.worker-progress`     |
//!
//! Derivation is pure; uniqueness of `I` comes from the bus's inbox
//! generator.

/// Suffix of the assignment-notice subject.
pub const ASSIGNMENT_SUFFIX: &str = ".worker-assigned";

/// Suffix of the progress subject.
pub const PROGRESS_SUFFIX: &str = ".worker-progress";

/// Result subject for inbox `inbox`.
pub fn result(inbox: &str) -> String {
    inbox.to_string()
}

/// Assignment-notice subject for inbox `inbox`.
pub fn assignment(inbox: &str) -> String {
    format!("{inbox}{ASSIGNMENT_SUFFIX}")
}

/// Progress subject for inbox `inbox`.
pub fn progress(inbox: &str) -> String {
    format!("{inbox}{PROGRESS_SUFFIX}")
}

/// The three subjects correlating one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationSubjects {
    pub result: String,
    pub assignment: String,
    pub progress: String,
}

impl CorrelationSubjects {
    pub fn from_inbox(inbox: &str) -> Self {
        Self {
            result: result(inbox),
            assignment: assignment(inbox),
            progress: progress(inbox),
        }
    }

    /// The inbox the triple was derived from.
    pub fn inbox(&self) -> &str {
        &self.result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn derives_expected_names() {
        let s = CorrelationSubjects::from_inbox("_INBOX.abc");
        assert_eq!(s.result, "_INBOX.abc");
        assert_eq!(s.assignment, "_INBOX.abc.worker-assigned");
        assert_eq!(s.progress, "_INBOX.abc.worker-progress");
        assert_eq!(s.inbox(), "_INBOX.abc");
    }

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(
            CorrelationSubjects::from_inbox("_INBOX.x"),
            CorrelationSubjects::from_inbox("_INBOX.x")
        );
    }

    #[test]
    fn distinct_inboxes_give_six_distinct_subjects() {
        let inboxes = [
            ("_INBOX.a", "_INBOX.b"),
            ("_INBOX.1", "_INBOX.10"),
            ("_INBOX.q", "_INBOX.q.x"),
        ];
        for (i1, i2) in inboxes {
            let a = CorrelationSubjects::from_inbox(i1);
            let b = CorrelationSubjects::from_inbox(i2);
            let all: HashSet<&str> = [
                a.result.as_str(),
                a.assignment.as_str(),
                a.progress.as_str(),
                b.result.as_str(),
                b.assignment.as_str(),
                b.progress.as_str(),
            ]
            .into_iter()
            .collect();
            assert_eq!(all.len(), 6, "collision between {i1} and {i2}");
        }
    }
}
