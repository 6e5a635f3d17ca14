//! Circuit breaker for destination protection.
//!
//! # States
//! - Closed: normal operation, attempts pass through
//! - Open: destination assumed down, attempts fail fast
//! - Half-Open: a bounded number of probes test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//!                and volume >= volume_threshold
//! Open → Half-Open: first admit after sleep_window
//! Half-Open → Closed: success_threshold probe successes
//! Half-Open → Open: any probe failure
//! ```
//!
//! # Design Decisions
//! - One circuit per route, each behind its own mutex in a sharded map
//! - Admission is a token consumed by `record`, so an attempt is recorded
//!   at most once; dropping it unrecorded frees a probe slot
//! - Every transition bumps an epoch; late records from an older epoch
//!   update totals but never move the state

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::net::Route;
use crate::observability::Metrics;

/// Circuit state for one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// How an attempt's outcome feeds the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitSignal {
    Success,
    Failure,
    /// Observed but neither success nor failure (4xx, cancellation).
    Neutral,
}

/// The circuit refused an attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit open for {route}, retry after {retry_after_hint:?}")]
pub struct CircuitOpenError {
    pub route: Route,
    /// Time until the circuit will admit a probe; zero while probes are in flight.
    pub retry_after_hint: Duration,
}

/// Circuit breaker statistics for one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub volume: u64,
    pub probes_in_flight: u32,
    pub total_admitted: u64,
    pub total_rejected: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_neutral: u64,
    /// Number of times the circuit has opened.
    pub open_count: u64,
    pub time_in_state: Duration,
}

struct RouteCircuit {
    state: CircuitState,
    consecutive_failures: u32,
    successes_in_half_open: u32,
    opened_at: Option<Instant>,
    volume: u64,
    probes_in_flight: u32,
    epoch: u64,
    last_transition: Instant,
    total_admitted: u64,
    total_rejected: u64,
    total_successes: u64,
    total_failures: u64,
    total_neutral: u64,
    open_count: u64,
}

impl RouteCircuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            successes_in_half_open: 0,
            opened_at: None,
            volume: 0,
            probes_in_flight: 0,
            epoch: 0,
            last_transition: Instant::now(),
            total_admitted: 0,
            total_rejected: 0,
            total_successes: 0,
            total_failures: 0,
            total_neutral: 0,
            open_count: 0,
        }
    }

    fn snapshot(&self) -> CircuitStats {
        CircuitStats {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            volume: self.volume,
            probes_in_flight: self.probes_in_flight,
            total_admitted: self.total_admitted,
            total_rejected: self.total_rejected,
            total_successes: self.total_successes,
            total_failures: self.total_failures,
            total_neutral: self.total_neutral,
            open_count: self.open_count,
            time_in_state: self.last_transition.elapsed(),
        }
    }

    fn transition(&mut self, route: &Route, to: CircuitState, metrics: Metrics) {
        let now = Instant::now();
        let from = self.state;
        self.state = to;
        self.epoch += 1;
        self.last_transition = now;
        self.probes_in_flight = 0;
        self.successes_in_half_open = 0;

        match to {
            CircuitState::Open => {
                self.opened_at = Some(now);
                self.open_count += 1;
            }
            CircuitState::Closed => {
                self.opened_at = None;
                self.consecutive_failures = 0;
                self.volume = 0;
            }
            CircuitState::HalfOpen => {}
        }

        metrics.record_circuit_transition(route, to);
        match to {
            CircuitState::Open => warn!(
                route = %route,
                from = from.as_str(),
                consecutive_failures = self.consecutive_failures,
                "Circuit opened"
            ),
            _ => info!(
                route = %route,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit transition"
            ),
        }
    }
}

/// An admitted attempt, to be handed back to [`CircuitBreaker::record`].
#[must_use = "an admission should be recorded with CircuitBreaker::record"]
pub struct Admission {
    circuit: Arc<Mutex<RouteCircuit>>,
    route: Route,
    probe: bool,
    epoch: u64,
    armed: bool,
}

impl Admission {
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Whether this attempt is a half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if !self.armed || !self.probe {
            return;
        }
        let mut circuit = lock(&self.circuit);
        if circuit.epoch == self.epoch && circuit.state == CircuitState::HalfOpen {
            circuit.probes_in_flight = circuit.probes_in_flight.saturating_sub(1);
            debug!(route = %self.route, "Unrecorded probe released its slot");
        }
    }
}

impl std::fmt::Debug for Admission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Admission")
            .field("route", &self.route)
            .field("probe", &self.probe)
            .field("epoch", &self.epoch)
            .finish()
    }
}

fn lock(circuit: &Mutex<RouteCircuit>) -> MutexGuard<'_, RouteCircuit> {
    circuit.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-route circuit breakers.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuits: DashMap<Route, Arc<Mutex<RouteCircuit>>>,
    metrics: Metrics,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_metrics(config, Metrics::default())
    }

    pub fn with_metrics(config: CircuitBreakerConfig, metrics: Metrics) -> Self {
        Self {
            config,
            circuits: DashMap::new(),
            metrics,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn circuit(&self, route: &Route) -> Arc<Mutex<RouteCircuit>> {
        if let Some(circuit) = self.circuits.get(route) {
            return Arc::clone(circuit.value());
        }
        Arc::clone(
            self.circuits
                .entry(route.clone())
                .or_insert_with(|| Arc::new(Mutex::new(RouteCircuit::new())))
                .value(),
        )
    }

    /// Ask whether an attempt to `route` may proceed.
    pub fn admit(&self, route: &Route) -> Result<Admission, CircuitOpenError> {
        let handle = self.circuit(route);
        let mut circuit = lock(&handle);

        if circuit.state == CircuitState::Open {
            let elapsed = circuit.opened_at.map(|t| t.elapsed()).unwrap_or_default();
            let sleep_window = self.config.sleep_window();
            if elapsed < sleep_window {
                circuit.total_rejected += 1;
                self.metrics.record_circuit_rejected(route);
                return Err(CircuitOpenError {
                    route: route.clone(),
                    retry_after_hint: sleep_window - elapsed,
                });
            }
            circuit.transition(route, CircuitState::HalfOpen, self.metrics);
        }

        let probe = circuit.state == CircuitState::HalfOpen;
        if probe {
            if circuit.probes_in_flight >= self.config.half_open_max_probes {
                circuit.total_rejected += 1;
                self.metrics.record_circuit_rejected(route);
                debug!(route = %route, "Half-open probe limit reached");
                return Err(CircuitOpenError {
                    route: route.clone(),
                    retry_after_hint: Duration::ZERO,
                });
            }
            circuit.probes_in_flight += 1;
        }

        circuit.total_admitted += 1;
        let epoch = circuit.epoch;
        drop(circuit);

        Ok(Admission {
            circuit: handle,
            route: route.clone(),
            probe,
            epoch,
            armed: true,
        })
    }

    /// Record the outcome of an admitted attempt. Returns the state after
    /// recording.
    pub fn record(&self, mut admission: Admission, signal: CircuitSignal) -> CircuitState {
        admission.armed = false;
        let route = admission.route.clone();
        let mut circuit = lock(&admission.circuit);

        match signal {
            CircuitSignal::Success => circuit.total_successes += 1,
            CircuitSignal::Failure => circuit.total_failures += 1,
            CircuitSignal::Neutral => circuit.total_neutral += 1,
        }

        if circuit.epoch != admission.epoch {
            debug!(
                route = %route,
                signal = ?signal,
                "Ignoring outcome from a previous circuit epoch"
            );
            return circuit.state;
        }

        match circuit.state {
            CircuitState::Closed => {
                circuit.volume += 1;
                match signal {
                    CircuitSignal::Success => circuit.consecutive_failures = 0,
                    CircuitSignal::Failure => {
                        circuit.consecutive_failures += 1;
                        debug!(
                            route = %route,
                            consecutive_failures = circuit.consecutive_failures,
                            threshold = self.config.failure_threshold,
                            volume = circuit.volume,
                            "Failure recorded in Closed state"
                        );
                        if circuit.consecutive_failures >= self.config.failure_threshold
                            && circuit.volume >= u64::from(self.config.volume_threshold)
                        {
                            circuit.transition(&route, CircuitState::Open, self.metrics);
                        }
                    }
                    CircuitSignal::Neutral => {}
                }
            }
            CircuitState::HalfOpen if admission.probe => {
                circuit.probes_in_flight = circuit.probes_in_flight.saturating_sub(1);
                match signal {
                    CircuitSignal::Success => {
                        circuit.successes_in_half_open += 1;
                        debug!(
                            route = %route,
                            successes = circuit.successes_in_half_open,
                            threshold = self.config.success_threshold,
                            "Probe succeeded"
                        );
                        if circuit.successes_in_half_open >= self.config.success_threshold {
                            circuit.transition(&route, CircuitState::Closed, self.metrics);
                        }
                    }
                    CircuitSignal::Failure => {
                        warn!(route = %route, "Probe failed, reopening circuit");
                        circuit.transition(&route, CircuitState::Open, self.metrics);
                    }
                    CircuitSignal::Neutral => {}
                }
            }
            // Only probes are admitted outside Closed within one epoch.
            CircuitState::HalfOpen | CircuitState::Open => {}
        }

        circuit.state
    }

    /// Current state of `route`'s circuit. Unknown routes are Closed.
    pub fn state(&self, route: &Route) -> CircuitState {
        self.circuits
            .get(route)
            .map(|c| lock(c.value()).state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Statistics for `route`. Unknown routes report a fresh Closed circuit
    /// and are not added to the map.
    pub fn stats(&self, route: &Route) -> CircuitStats {
        match self.circuits.get(route) {
            Some(handle) => lock(handle.value()).snapshot(),
            None => RouteCircuit::new().snapshot(),
        }
    }

    /// Routes with circuit state.
    pub fn tracked_routes(&self) -> usize {
        self.circuits.len()
    }

    /// Force `route`'s circuit Closed. Unknown routes are already Closed.
    pub fn reset(&self, route: &Route) {
        let Some(handle) = self.circuits.get(route).map(|c| Arc::clone(c.value())) else {
            return;
        };
        let mut circuit = lock(&handle);
        if circuit.state != CircuitState::Closed {
            circuit.transition(route, CircuitState::Closed, self.metrics);
        } else {
            circuit.consecutive_failures = 0;
            circuit.volume = 0;
        }
    }
}
