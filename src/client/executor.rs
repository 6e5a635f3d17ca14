//! Request execution.
//!
//! # Attempt Loop
//! ```text
//! admit (circuit) ──rejected──→ CircuitOpen
//!     ↓
//! checkout (pool, bounded by pool_wait_timeout) ──timed out──→ PoolExhausted
//!     ↓
//! connect → send + read body (connect, rolling read and total deadlines)
//!     ↓
//! classify → record (circuit) → release (pool)
//!     ↓
//! success → Ok(response)
//! otherwise → eligible? policy says retry? → backoff sleep → admit ...
//! ```
//!
//! # Design Decisions
//! - `record` and `release` run exactly once per attempt, on every path
//!   including timeout and cancellation
//! - The connection is held outside the raced future so a timed-out
//!   exchange still hands it back to the pool (which destroys it)
//! - Pool exhaustion and open circuits are surfaced immediately

use std::sync::Arc;

use bytes::BytesMut;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::client::outcome::{AttemptOutcome, FailureReason, OutcomeKind};
use crate::client::request::{Request, Response};
use crate::config::{validate_config, ClientConfig, ConfigError};
use crate::error::{ClientError, ErrorContext};
use crate::net::{Connection, ResponseBody, Route, Transport};
use crate::observability::{AttemptEvent, EventSink, Metrics, TracingEventSink};
use crate::pool::{AcquireError, ConnectionPool};
use crate::resilience::retries::backoff_sleep;
use crate::resilience::{
    AttemptDeadline, CircuitBreaker, Interrupt, RetryDecision, RetryPolicy, RetryState,
    StopReason, TimeoutManager, TimeoutPhase,
};

/// Executes requests with pooling, circuit breaking, timeouts and retries.
///
/// Cloning is cheap; clones share the pool and circuit state.
pub struct RequestExecutor<T: Transport> {
    config: Arc<ClientConfig>,
    pool: ConnectionPool<T>,
    breaker: Arc<CircuitBreaker>,
    timeouts: TimeoutManager,
    policy: RetryPolicy,
    events: Arc<dyn EventSink>,
    metrics: Metrics,
}

impl<T: Transport> Clone for RequestExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            pool: self.pool.clone(),
            breaker: Arc::clone(&self.breaker),
            timeouts: self.timeouts,
            policy: self.policy.clone(),
            events: Arc::clone(&self.events),
            metrics: self.metrics,
        }
    }
}

impl<T: Transport> RequestExecutor<T> {
    /// Validate `config` and build the executor's components.
    pub fn new(config: ClientConfig, transport: T) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let timeouts = TimeoutManager::from_config(&config.timeouts)?;
        let metrics = Metrics::new(config.observability.metrics_enabled);

        tracing::debug!(
            max_per_route = config.pool.max_per_route,
            max_total = config.pool.max_total,
            failure_threshold = config.circuit_breaker.failure_threshold,
            max_attempts = config.retries.max_attempts,
            total_timeout_ms = config.timeouts.total_ms,
            "Request executor configured"
        );

        Ok(Self {
            pool: ConnectionPool::with_metrics(transport, config.pool.clone(), metrics),
            breaker: Arc::new(CircuitBreaker::with_metrics(
                config.circuit_breaker.clone(),
                metrics,
            )),
            policy: RetryPolicy::from_config(&config.retries),
            timeouts,
            events: Arc::new(TracingEventSink::new(metrics)),
            metrics,
            config: Arc::new(config),
        })
    }

    /// Send attempt events to `sink` instead of the tracing sink.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPool<T> {
        &self.pool
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn timeouts(&self) -> &TimeoutManager {
        &self.timeouts
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    /// Execute `request` under the configured retry policy.
    pub async fn execute(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<Response, ClientError> {
        self.execute_with_policy(request, &self.policy, cancel).await
    }

    /// Execute `request` under `policy` instead of the configured one.
    pub async fn execute_with_policy(
        &self,
        request: &Request,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Response, ClientError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            route = %request.route(),
        );
        self.run(request_id, request, policy, cancel).instrument(span).await
    }

    async fn run(
        &self,
        request_id: Uuid,
        request: &Request,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Response, ClientError> {
        let route = request.route();
        let eligible = request.idempotency().is_retry_eligible();
        let mut state = RetryState::new();

        loop {
            if cancel.is_cancelled() {
                return Err(self.finish_cancelled(request_id, route, &state));
            }

            let admission = match self.breaker.admit(route) {
                Ok(admission) => admission,
                Err(error) => {
                    tracing::debug!(hint = ?error.retry_after_hint, "Circuit rejected attempt");
                    self.emit_terminal(request_id, route, &state, OutcomeKind::CircuitOpen);
                    return Err(ClientError::CircuitOpen {
                        error,
                        context: context(route, &state),
                    });
                }
            };

            state = state.next_attempt();
            let attempt = state.attempt_count();
            let started = Instant::now();
            let outcome = self.attempt(request, cancel).await;
            let latency = started.elapsed();

            let signal = outcome.circuit_signal(self.config.circuit_breaker.count_pool_exhaustion);
            let circuit_state = self.breaker.record(admission, signal);
            self.emit(AttemptEvent {
                request_id,
                route: route.clone(),
                attempt,
                outcome: outcome.kind(),
                latency,
                circuit_state,
                terminal: false,
            });

            let outcome = match outcome {
                AttemptOutcome::Success(response) => {
                    let kind = OutcomeKind::Success(response.status().as_u16());
                    self.emit_terminal(request_id, route, &state, kind);
                    return Ok(response);
                }
                other => other,
            };
            match &outcome {
                AttemptOutcome::Cancelled => {
                    return Err(self.finish_cancelled(request_id, route, &state));
                }
                AttemptOutcome::RetryableFailure(FailureReason::PoolExhausted(error)) => {
                    self.emit_terminal(request_id, route, &state, outcome.kind());
                    return Err(ClientError::PoolExhausted {
                        error: error.clone(),
                        context: context(route, &state),
                    });
                }
                _ => {}
            }

            if !outcome.is_retryable() || !eligible {
                if outcome.is_retryable() {
                    tracing::debug!(outcome = %outcome, "Request is not retry-eligible");
                }
                self.emit_terminal(request_id, route, &state, outcome.kind());
                return Err(ClientError::NonRetryableTransport {
                    context: context(route, &state),
                    cause: outcome,
                });
            }

            let stop = match policy.should_retry(&outcome, &state) {
                RetryDecision::RetryAfter(delay) => {
                    tracing::info!(
                        attempt,
                        outcome = %outcome,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying request"
                    );
                    self.metrics.record_retry(route);
                    state = state.with_delay(delay);
                    if backoff_sleep(delay, cancel).await.is_err() {
                        return Err(self.finish_cancelled(request_id, route, &state));
                    }
                    continue;
                }
                RetryDecision::Stop(reason) => reason,
            };

            self.emit_terminal(request_id, route, &state, outcome.kind());
            let context = context(route, &state);
            tracing::warn!(
                attempts = attempt,
                reason = ?stop,
                outcome = %outcome,
                "Giving up on request"
            );
            return Err(match stop {
                StopReason::MaxAttempts => ClientError::MaxAttemptsExceeded {
                    last_outcome: outcome,
                    context,
                },
                StopReason::MaxElapsed => ClientError::MaxElapsedExceeded {
                    last_outcome: outcome,
                    context,
                },
                StopReason::Cancelled => ClientError::Cancelled { context },
                StopReason::Disabled => match outcome {
                    AttemptOutcome::Timeout(phase) => ClientError::Timeout { phase, context },
                    cause => ClientError::RetryableTransport { cause, context },
                },
                StopReason::NotRetryable => ClientError::NonRetryableTransport {
                    cause: outcome,
                    context,
                },
            });
        }
    }

    /// One attempt: check out, connect, exchange, release. The total deadline
    /// starts once the pool has handed out a connection or capacity; time
    /// queued in the pool is bounded by `pool_wait_timeout` alone.
    async fn attempt(&self, request: &Request, cancel: &CancellationToken) -> AttemptOutcome {
        let route = request.route();
        let checkout = match self.pool.checkout(route, cancel).await {
            Ok(checkout) => checkout,
            Err(err) => return acquire_outcome(err, None),
        };

        let deadline = self.timeouts.start(cancel);
        let acquired = deadline
            .run(self.pool.connect(checkout, deadline.connect_timeout(), cancel))
            .await;
        let mut conn = match acquired {
            Ok(Ok(conn)) => conn,
            Ok(Err(err)) => return acquire_outcome(err, Some(&deadline)),
            Err(interrupt) => return interrupted(interrupt),
        };

        let outcome = match deadline.run(exchange(&mut *conn, request, &deadline)).await {
            Ok(outcome) => outcome,
            Err(interrupt) => interrupted(interrupt),
        };
        self.pool.release(conn, &outcome);
        outcome
    }

    fn finish_cancelled(&self, request_id: Uuid, route: &Route, state: &RetryState) -> ClientError {
        tracing::debug!(attempts = state.attempt_count(), "Request cancelled");
        self.emit_terminal(request_id, route, state, OutcomeKind::Cancelled);
        ClientError::Cancelled {
            context: context(route, state),
        }
    }

    fn emit_terminal(
        &self,
        request_id: Uuid,
        route: &Route,
        state: &RetryState,
        outcome: OutcomeKind,
    ) {
        self.emit(AttemptEvent {
            request_id,
            route: route.clone(),
            attempt: state.attempt_count(),
            outcome,
            latency: state.elapsed(),
            circuit_state: self.breaker.state(route),
            terminal: true,
        });
    }

    fn emit(&self, event: AttemptEvent) {
        self.events.on_event(&event);
    }
}

/// Send the request and read the whole body, each read under a fresh read
/// window.
async fn exchange<C: Connection>(
    conn: &mut C,
    request: &Request,
    deadline: &AttemptDeadline,
) -> AttemptOutcome {
    let response = match deadline.read(conn.send(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => return AttemptOutcome::from_transport_error(err),
        Err(interrupt) => return interrupted(interrupt),
    };

    let (parts, mut body) = response.into_parts();
    let mut buf = BytesMut::new();
    loop {
        match deadline.read(body.next_chunk()).await {
            Ok(Ok(Some(chunk))) => buf.extend_from_slice(&chunk),
            Ok(Ok(None)) => break,
            Ok(Err(err)) => return AttemptOutcome::from_transport_error(err),
            Err(interrupt) => return interrupted(interrupt),
        }
    }
    AttemptOutcome::from_response(http::Response::from_parts(parts, buf.freeze()))
}

fn acquire_outcome(err: AcquireError, deadline: Option<&AttemptDeadline>) -> AttemptOutcome {
    match err {
        AcquireError::Exhausted(e) => {
            AttemptOutcome::RetryableFailure(FailureReason::PoolExhausted(e))
        }
        AcquireError::Connect(e) => AttemptOutcome::from_transport_error(e),
        AcquireError::Cancelled => AttemptOutcome::Cancelled,
        AcquireError::ConnectTimeout if deadline.is_some_and(|d| d.remaining().is_zero()) => {
            AttemptOutcome::Timeout(TimeoutPhase::Total)
        }
        AcquireError::ConnectTimeout => AttemptOutcome::Timeout(TimeoutPhase::Connect),
    }
}

fn interrupted(interrupt: Interrupt) -> AttemptOutcome {
    match interrupt {
        Interrupt::Timeout(phase) => AttemptOutcome::Timeout(phase),
        Interrupt::Cancelled => AttemptOutcome::Cancelled,
    }
}

fn context(route: &Route, state: &RetryState) -> ErrorContext {
    ErrorContext {
        route: route.clone(),
        attempts: state.attempt_count(),
        elapsed: state.elapsed(),
    }
}

impl<T: Transport> std::fmt::Debug for RequestExecutor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("pool", &self.pool.stats())
            .field("policy", &self.policy)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}
