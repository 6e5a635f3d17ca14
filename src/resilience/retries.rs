//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether an attempt outcome is worth another attempt
//! - Pick the delay: `Retry-After` if the server sent one, full jitter otherwise
//! - Enforce `max_attempts` and the `max_elapsed` budget
//!
//! # Design Decisions
//! - Eligibility (idempotent or keyed requests only) is checked by the
//!   executor before the policy is consulted
//! - `RetryState` belongs to one logical request and moves by value
//! - The backoff sleep races the caller's cancellation token

use std::time::{Duration, SystemTime};

use http::header::RETRY_AFTER;
use http::{HeaderMap, StatusCode};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::client::{AttemptOutcome, FailureReason};
use crate::config::RetryConfig;
use crate::resilience::backoff::full_jitter;
use crate::resilience::timeouts::Interrupt;

/// Statuses worth retrying: 408, 429, 500, 502, 503, 504.
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
}

/// Parse a `Retry-After` header as delta-seconds or an HTTP-date relative to
/// `now`. Dates in the past yield zero.
pub fn parse_retry_after(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = httpdate::parse_http_date(value).ok()?;
    Some(at.duration_since(now).unwrap_or(Duration::ZERO))
}

/// Why no further attempt will be made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The outcome is final (success, 4xx, non-retryable error).
    NotRetryable,
    /// Retries are turned off.
    Disabled,
    MaxAttempts,
    MaxElapsed,
    Cancelled,
}

/// Result of consulting the policy after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Stop(StopReason),
    RetryAfter(Duration),
}

/// Bookkeeping for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt_count: u32,
    first_attempt_at: Instant,
    last_delay: Option<Duration>,
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            attempt_count: 0,
            first_attempt_at: Instant::now(),
            last_delay: None,
        }
    }

    /// Count one more attempt.
    pub fn next_attempt(self) -> Self {
        Self {
            attempt_count: self.attempt_count + 1,
            ..self
        }
    }

    /// Remember the delay chosen before the next attempt.
    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            last_delay: Some(delay),
            ..self
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn first_attempt_at(&self) -> Instant {
        self.first_attempt_at
    }

    pub fn last_delay(&self) -> Option<Duration> {
        self.last_delay
    }

    pub fn elapsed(&self) -> Duration {
        self.first_attempt_at.elapsed()
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry policy: attempt budget, elapsed budget and backoff window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    enabled: bool,
    max_attempts: u32,
    base: Duration,
    cap: Duration,
    max_elapsed: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration, cap: Duration, max_elapsed: Duration) -> Self {
        Self {
            enabled: true,
            max_attempts,
            base,
            cap,
            max_elapsed,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            base: config.base_delay(),
            cap: config.max_delay(),
            max_elapsed: config.max_elapsed(),
        }
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::from_config(&RetryConfig::default())
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    /// Decide what to do after the attempt counted in `state` produced `outcome`.
    pub fn should_retry(&self, outcome: &AttemptOutcome, state: &RetryState) -> RetryDecision {
        if matches!(outcome, AttemptOutcome::Cancelled) {
            return RetryDecision::Stop(StopReason::Cancelled);
        }
        if !outcome.is_retryable() {
            return RetryDecision::Stop(StopReason::NotRetryable);
        }
        if !self.enabled {
            return RetryDecision::Stop(StopReason::Disabled);
        }
        if state.attempt_count >= self.max_attempts {
            return RetryDecision::Stop(StopReason::MaxAttempts);
        }

        let elapsed = state.elapsed();
        if elapsed >= self.max_elapsed {
            return RetryDecision::Stop(StopReason::MaxElapsed);
        }

        let delay = retry_after_of(outcome)
            .unwrap_or_else(|| full_jitter(state.attempt_count, self.base, self.cap));
        if elapsed + delay > self.max_elapsed {
            return RetryDecision::Stop(StopReason::MaxElapsed);
        }
        RetryDecision::RetryAfter(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

fn retry_after_of(outcome: &AttemptOutcome) -> Option<Duration> {
    match outcome {
        AttemptOutcome::RetryableFailure(FailureReason::Status(response)) => {
            parse_retry_after(response.headers(), SystemTime::now())
        }
        _ => None,
    }
}

/// Sleep for `delay` unless `cancel` fires first.
pub async fn backoff_sleep(delay: Duration, cancel: &CancellationToken) -> Result<(), Interrupt> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        _ = time::sleep(delay) => Ok(()),
    }
}
