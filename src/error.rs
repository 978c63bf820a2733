//! Error types for the login and reservation phases.
//!
//! Every failure here is contained at the unit boundary (one login, one
//! submission) and reported as a value. None of them abort a run; the only
//! run-level stop is [`RunOutcome::NoSessions`](crate::RunOutcome::NoSessions).

use std::fmt;
use std::time::Duration;

/// Why an account could not be authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The login endpoint answered but refused the credentials.
    Rejected(String),
    /// The login call itself failed (network, protocol, captcha, ...).
    Transport(String),
    /// The login call did not finish within the configured timeout.
    TimedOut(Duration),
    /// The login task panicked.
    Crashed(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(detail) => write!(f, "Login rejected: {}", detail),
            Self::Transport(detail) => write!(f, "Login failed: {}", detail),
            Self::TimedOut(after) => write!(f, "Login timed out after {:?}", after),
            Self::Crashed(detail) => write!(f, "Login task crashed: {}", detail),
        }
    }
}

impl std::error::Error for AuthError {}

/// Why a single (account, task) attempt did not reserve its seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    /// The endpoint answered with an unsuccessful result.
    Rejected,
    /// The submit call raised an error.
    Transport(String),
    /// The submit call did not finish within the configured timeout.
    TimedOut(Duration),
    /// The worker running the attempt panicked.
    Crashed(String),
}

impl SubmissionError {
    /// Whether the failure came from the worker itself rather than the endpoint.
    pub fn is_crash(&self) -> bool {
        matches!(self, Self::Crashed(_))
    }
}

impl fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => write!(f, "Reservation rejected"),
            Self::Transport(detail) => write!(f, "Reservation request failed: {}", detail),
            Self::TimedOut(after) => write!(f, "Reservation request timed out after {:?}", after),
            Self::Crashed(detail) => write!(f, "Reservation worker crashed: {}", detail),
        }
    }
}

impl std::error::Error for SubmissionError {}

/// Unattended credentials do not cover an account at some position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationMismatch {
    /// Position of the account in configuration order.
    pub index: usize,
    /// Configuration identifier of the uncovered account.
    pub account_id: String,
}

impl fmt::Display for ConfigurationMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "No external credentials for account `{}` at index {}",
            self.account_id, self.index
        )
    }
}

impl std::error::Error for ConfigurationMismatch {}
