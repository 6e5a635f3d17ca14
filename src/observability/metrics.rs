//! Metrics collection.
//!
//! # Metrics
//! - `http_client_attempts_total` (counter): attempts by route, outcome
//! - `http_client_attempt_duration_seconds` (histogram): attempt latency
//! - `http_client_retries_total` (counter): retries scheduled by route
//! - `http_client_pool_connections_created_total` (counter)
//! - `http_client_pool_connections_reused_total` (counter)
//! - `http_client_pool_connections_destroyed_total` (counter): by reason
//! - `http_client_pool_exhausted_total` (counter)
//! - `http_client_circuit_transitions_total` (counter): by route, to-state
//! - `http_client_circuit_rejections_total` (counter)
//! - `http_client_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//!
//! # Design Decisions
//! - Goes through the `metrics` facade; exporting is up to the application
//! - Labels are route and a small fixed vocabulary, never request data
//! - Recording is switched per executor through a [`Metrics`] handle, so two
//!   clients in one process keep their own setting

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::net::Route;
use crate::resilience::CircuitState;

/// Metric recording handle, copied into every component of one executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metrics {
    enabled: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Metrics {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_attempt(&self, route: &Route, outcome: &'static str, latency: Duration) {
        if !self.enabled {
            return;
        }
        let route = route.to_string();
        counter!("http_client_attempts_total", "route" => route.clone(), "outcome" => outcome)
            .increment(1);
        histogram!("http_client_attempt_duration_seconds", "route" => route)
            .record(latency.as_secs_f64());
    }

    pub fn record_retry(&self, route: &Route) {
        if !self.enabled {
            return;
        }
        counter!("http_client_retries_total", "route" => route.to_string()).increment(1);
    }

    pub fn record_pool_connection_created(&self, route: &Route) {
        if !self.enabled {
            return;
        }
        counter!("http_client_pool_connections_created_total", "route" => route.to_string())
            .increment(1);
    }

    pub fn record_pool_connection_reused(&self, route: &Route) {
        if !self.enabled {
            return;
        }
        counter!("http_client_pool_connections_reused_total", "route" => route.to_string())
            .increment(1);
    }

    pub fn record_pool_connection_destroyed(&self, route: &Route, reason: &'static str) {
        if !self.enabled {
            return;
        }
        counter!(
            "http_client_pool_connections_destroyed_total",
            "route" => route.to_string(),
            "reason" => reason
        )
        .increment(1);
    }

    pub fn record_pool_exhausted(&self, route: &Route) {
        if !self.enabled {
            return;
        }
        counter!("http_client_pool_exhausted_total", "route" => route.to_string()).increment(1);
    }

    pub fn record_circuit_transition(&self, route: &Route, to: CircuitState) {
        if !self.enabled {
            return;
        }
        let route = route.to_string();
        counter!(
            "http_client_circuit_transitions_total",
            "route" => route.clone(),
            "to" => to.as_str()
        )
        .increment(1);
        let value = match to {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        };
        gauge!("http_client_circuit_state", "route" => route).set(value);
    }

    pub fn record_circuit_rejected(&self, route: &Route) {
        if !self.enabled {
            return;
        }
        counter!("http_client_circuit_rejections_total", "route" => route.to_string())
            .increment(1);
    }
}
