//! Subject validation and wildcard matching.
//!
//! Subjects are dot-separated tokens. Subscription patterns may use
//! `*` to match exactly one token and a trailing `>` to match one or
//! more remaining tokens.

use crate::error::BusError;

const SINGLE_WILDCARD: &str = "*";
const TAIL_WILDCARD: &str = ">";

fn invalid(subject: &str, reason: &str) -> BusError {
    BusError::InvalidSubject {
        subject: subject.to_string(),
        reason: reason.to_string(),
    }
}

fn check_tokens(subject: &str) -> Result<(), BusError> {
    if subject.is_empty() {
        return Err(invalid(subject, "must not be empty"));
    }
    if subject.chars().any(char::is_whitespace) {
        return Err(invalid(subject, "must not contain whitespace"));
    }
    if subject.split('.').any(str::is_empty) {
        return Err(invalid(subject, "must not contain empty tokens"));
    }
    Ok(())
}

/// Validate a concrete subject used for publishing.
pub fn validate_subject(subject: &str) -> Result<(), BusError> {
    check_tokens(subject)?;
    if subject
        .split('.')
        .any(|t| t == SINGLE_WILDCARD || t == TAIL_WILDCARD)
    {
        return Err(invalid(subject, "wildcards are not allowed when publishing"));
    }
    Ok(())
}

/// Validate a subscription pattern.
pub fn validate_pattern(pattern: &str) -> Result<(), BusError> {
    check_tokens(pattern)?;
    let tokens: Vec<&str> = pattern.split('.').collect();
    for (i, token) in tokens.iter().enumerate() {
        if *token == TAIL_WILDCARD && i + 1 != tokens.len() {
            return Err(invalid(pattern, "'>' is only allowed as the last token"));
        }
        if token.len() > 1 && (token.contains('*') || token.contains('>')) {
            return Err(invalid(pattern, "wildcards must be whole tokens"));
        }
    }
    Ok(())
}

/// Whether `subject` is matched by subscription `pattern`.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(TAIL_WILDCARD), Some(_)) => return true,
            (Some(SINGLE_WILDCARD), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_match() {
        assert!(matches("request-worker", "request-worker"));
        assert!(!matches("request-worker", "request-worker.all"));
        assert!(!matches("request-worker.all", "request-worker"));
    }

    #[test]
    fn single_wildcard_matches_one_token() {
        assert!(matches("workers.*.jobs", "workers.abc.jobs"));
        assert!(!matches("workers.*.jobs", "workers.abc.def.jobs"));
        assert!(!matches("workers.*", "workers"));
    }

    #[test]
    fn tail_wildcard_matches_one_or_more() {
        assert!(matches("_INBOX.>", "_INBOX.abc"));
        assert!(matches("_INBOX.>", "_INBOX.abc.worker-progress"));
        assert!(!matches("_INBOX.>", "_INBOX"));
    }

    #[test]
    fn inbox_does_not_match_derived_subjects() {
        assert!(!matches("_INBOX.abc", "_INBOX.abc.worker-assigned"));
    }

    #[test]
    fn publish_subjects_reject_wildcards_and_empty_tokens() {
        assert!(validate_subject("a.b").is_ok());
        assert!(validate_subject("a.*").is_err());
        assert!(validate_subject("a.>").is_err());
        assert!(validate_subject("a..b").is_err());
        assert!(validate_subject("").is_err());
        assert!(validate_subject("a b").is_err());
    }

    #[test]
    fn patterns_validate_wildcard_placement() {
        assert!(validate_pattern("a.*.c").is_ok());
        assert!(validate_pattern("a.>").is_ok());
        assert!(validate_pattern("a.>.c").is_err());
        assert!(validate_pattern("a.b*").is_err());
    }
}
