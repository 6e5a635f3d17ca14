//! Errors surfaced by [`RequestExecutor`](crate::client::RequestExecutor).

use std::fmt;
use std::time::{Duration, SystemTime};

use crate::client::{AttemptOutcome, FailureReason, Response};
use crate::net::Route;
use crate::pool::PoolExhaustedError;
use crate::resilience::retries::parse_retry_after;
use crate::resilience::{CircuitOpenError, TimeoutPhase};

/// Where and how far a request got before it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub route: Route,
    /// Attempts that reached the network or the pool.
    pub attempts: u32,
    /// Time since the request started.
    pub elapsed: Duration,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} attempt(s) in {:?}", self.route, self.attempts, self.elapsed)
    }
}

/// Terminal failure of a logical request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("{phase} timeout ({context})")]
    Timeout { phase: TimeoutPhase, context: ErrorContext },

    #[error("{error} ({context})")]
    CircuitOpen {
        error: CircuitOpenError,
        context: ErrorContext,
    },

    #[error("{error} ({context})")]
    PoolExhausted {
        error: PoolExhaustedError,
        context: ErrorContext,
    },

    #[error("retryable transport failure: {cause} ({context})")]
    RetryableTransport {
        cause: AttemptOutcome,
        context: ErrorContext,
    },

    #[error("non-retryable failure: {cause} ({context})")]
    NonRetryableTransport {
        cause: AttemptOutcome,
        context: ErrorContext,
    },

    #[error("max attempts exceeded, last outcome: {last_outcome} ({context})")]
    MaxAttemptsExceeded {
        last_outcome: AttemptOutcome,
        context: ErrorContext,
    },

    #[error("max elapsed time exceeded, last outcome: {last_outcome} ({context})")]
    MaxElapsedExceeded {
        last_outcome: AttemptOutcome,
        context: ErrorContext,
    },

    #[error("request cancelled ({context})")]
    Cancelled { context: ErrorContext },
}

impl ClientError {
    pub fn context(&self) -> &ErrorContext {
        match self {
            ClientError::Timeout { context, .. }
            | ClientError::CircuitOpen { context, .. }
            | ClientError::PoolExhausted { context, .. }
            | ClientError::RetryableTransport { context, .. }
            | ClientError::NonRetryableTransport { context, .. }
            | ClientError::MaxAttemptsExceeded { context, .. }
            | ClientError::MaxElapsedExceeded { context, .. }
            | ClientError::Cancelled { context } => context,
        }
    }

    /// Whether the caller could reasonably try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout { .. }
                | ClientError::CircuitOpen { .. }
                | ClientError::PoolExhausted { .. }
                | ClientError::RetryableTransport { .. }
        )
    }

    /// How long the server or the circuit asked the caller to wait, if known.
    pub fn retry_after_hint(&self) -> Option<Duration> {
        match self {
            ClientError::CircuitOpen { error, .. } => Some(error.retry_after_hint),
            _ => self
                .last_outcome()
                .and_then(AttemptOutcome::response)
                .and_then(|r| parse_retry_after(r.headers(), SystemTime::now())),
        }
    }

    /// The outcome of the last attempt, for variants that carry one.
    pub fn last_outcome(&self) -> Option<&AttemptOutcome> {
        match self {
            ClientError::RetryableTransport { cause, .. }
            | ClientError::NonRetryableTransport { cause, .. } => Some(cause),
            ClientError::MaxAttemptsExceeded { last_outcome, .. }
            | ClientError::MaxElapsedExceeded { last_outcome, .. } => Some(last_outcome),
            _ => None,
        }
    }

    /// The failure reason of the last attempt, if any.
    pub fn reason(&self) -> Option<&FailureReason> {
        self.last_outcome().and_then(AttemptOutcome::reason)
    }

    /// The last response received, for status failures.
    pub fn response(&self) -> Option<&Response> {
        self.last_outcome().and_then(AttemptOutcome::response)
    }
}
