//! Attempt outcomes and their classification.

use std::fmt;

use serde::Serialize;

use crate::client::request::Response;
use crate::net::TransportError;
use crate::pool::PoolExhaustedError;
use crate::resilience::retries::is_retryable_status;
use crate::resilience::{CircuitSignal, TimeoutPhase};

/// What went wrong on a failed attempt.
#[derive(Debug, Clone)]
pub enum FailureReason {
    /// The server answered with a failure status; the full response is kept.
    Status(Response),
    Transport(TransportError),
    PoolExhausted(PoolExhaustedError),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Status(response) => write!(f, "status {}", response.status()),
            FailureReason::Transport(e) => write!(f, "{e}"),
            FailureReason::PoolExhausted(e) => write!(f, "{e}"),
        }
    }
}

/// Result of a single attempt.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Success(Response),
    RetryableFailure(FailureReason),
    NonRetryableFailure(FailureReason),
    Timeout(TimeoutPhase),
    Cancelled,
}

impl AttemptOutcome {
    /// Classify a complete response: 2xx/3xx succeed, the transient statuses
    /// (408, 429, 500, 502, 503, 504) are retryable, everything else is final.
    pub fn from_response(response: Response) -> Self {
        let status = response.status();
        if status.is_success() || status.is_redirection() || status.is_informational() {
            AttemptOutcome::Success(response)
        } else if is_retryable_status(status) {
            AttemptOutcome::RetryableFailure(FailureReason::Status(response))
        } else {
            AttemptOutcome::NonRetryableFailure(FailureReason::Status(response))
        }
    }

    pub fn from_transport_error(err: TransportError) -> Self {
        if err.is_retryable() {
            AttemptOutcome::RetryableFailure(FailureReason::Transport(err))
        } else {
            AttemptOutcome::NonRetryableFailure(FailureReason::Transport(err))
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }

    /// Whether the retry policy may consider another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttemptOutcome::RetryableFailure(_) | AttemptOutcome::Timeout(_))
    }

    /// The failure reason, if this outcome carries one.
    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            AttemptOutcome::RetryableFailure(r) | AttemptOutcome::NonRetryableFailure(r) => Some(r),
            _ => None,
        }
    }

    /// The response, for outcomes that carry one.
    pub fn response(&self) -> Option<&Response> {
        match self {
            AttemptOutcome::Success(response) => Some(response),
            _ => match self.reason() {
                Some(FailureReason::Status(response)) => Some(response),
                _ => None,
            },
        }
    }

    /// Whether the exchange completed cleanly enough for the connection to
    /// be reused: a full response was read, whatever its status.
    pub fn leaves_connection_reusable(&self) -> bool {
        self.response().is_some()
    }

    /// How this outcome feeds the circuit breaker. 4xx and cancellation are
    /// neutral; 5xx, timeouts and transport errors are failures.
    pub fn circuit_signal(&self, count_pool_exhaustion: bool) -> CircuitSignal {
        match self {
            AttemptOutcome::Success(_) => CircuitSignal::Success,
            AttemptOutcome::Timeout(_) => CircuitSignal::Failure,
            AttemptOutcome::Cancelled => CircuitSignal::Neutral,
            AttemptOutcome::RetryableFailure(reason)
            | AttemptOutcome::NonRetryableFailure(reason) => match reason {
                FailureReason::Status(response) if response.status().is_server_error() => {
                    CircuitSignal::Failure
                }
                FailureReason::Status(_) => CircuitSignal::Neutral,
                FailureReason::Transport(_) => CircuitSignal::Failure,
                FailureReason::PoolExhausted(_) if count_pool_exhaustion => CircuitSignal::Failure,
                FailureReason::PoolExhausted(_) => CircuitSignal::Neutral,
            },
        }
    }

    /// A serializable summary.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            AttemptOutcome::Success(response) => OutcomeKind::Success(response.status().as_u16()),
            AttemptOutcome::Timeout(phase) => OutcomeKind::Timeout(*phase),
            AttemptOutcome::Cancelled => OutcomeKind::Cancelled,
            AttemptOutcome::RetryableFailure(reason)
            | AttemptOutcome::NonRetryableFailure(reason) => match reason {
                FailureReason::Status(response) => OutcomeKind::Status(response.status().as_u16()),
                FailureReason::Transport(_) => OutcomeKind::Transport,
                FailureReason::PoolExhausted(_) => OutcomeKind::PoolExhausted,
            },
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success(response) => write!(f, "success ({})", response.status()),
            AttemptOutcome::RetryableFailure(reason) => write!(f, "retryable failure: {reason}"),
            AttemptOutcome::NonRetryableFailure(reason) => {
                write!(f, "non-retryable failure: {reason}")
            }
            AttemptOutcome::Timeout(phase) => write!(f, "{phase} timeout"),
            AttemptOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Compact, serializable description of an outcome, used in events and
/// metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeKind {
    Success(u16),
    Status(u16),
    Timeout(TimeoutPhase),
    Transport,
    PoolExhausted,
    CircuitOpen,
    Cancelled,
}

impl OutcomeKind {
    /// Low-cardinality label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeKind::Success(_) => "success",
            OutcomeKind::Status(code) if *code >= 500 => "server_error",
            OutcomeKind::Status(_) => "client_error",
            OutcomeKind::Timeout(TimeoutPhase::Connect) => "connect_timeout",
            OutcomeKind::Timeout(TimeoutPhase::Read) => "read_timeout",
            OutcomeKind::Timeout(TimeoutPhase::Total) => "total_timeout",
            OutcomeKind::Transport => "transport_error",
            OutcomeKind::PoolExhausted => "pool_exhausted",
            OutcomeKind::CircuitOpen => "circuit_open",
            OutcomeKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Success(code) | OutcomeKind::Status(code) => {
                write!(f, "{} ({code})", self.label())
            }
            _ => f.write_str(self.label()),
        }
    }
}
