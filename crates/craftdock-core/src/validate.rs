//! Submission-time validation of request drafts.
//!
//! Checks run before anything is written; a failure rejects the submission
//! with a readable message and has no side effects.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Maximum raw server name length, checked before sanitization.
pub const MAX_SERVERNAME_LEN: usize = 20;

/// Maximum raw email length.
pub const MAX_EMAIL_LEN: usize = 50;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$")
        .expect("static regex is valid")
});

/// Rejection reasons for a submitted request draft.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("please enter a valid email address")]
    InvalidEmail,

    #[error("email must be {MAX_EMAIL_LEN} characters or less")]
    EmailTooLong,

    #[error("server name must be {MAX_SERVERNAME_LEN} characters or less")]
    ServerNameTooLong,
}

/// Validate the user-controlled fields of a submission.
///
/// `raw_servername` is the pre-sanitization input; the length limit applies
/// to what the user typed, not to the sanitized token.
pub fn validate_submission(email: &str, raw_servername: &str) -> Result<(), ValidationError> {
    if !EMAIL_RE.is_match(email) {
        return Err(ValidationError::InvalidEmail);
    }
    if raw_servername.chars().count() > MAX_SERVERNAME_LEN {
        return Err(ValidationError::ServerNameTooLong);
    }
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(ValidationError::EmailTooLong);
    }
    Ok(())
}
