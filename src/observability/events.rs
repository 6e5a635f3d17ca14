//! Per-attempt events.
//!
//! Every attempt produces one [`AttemptEvent`], and every request one more
//! with `terminal = true` describing how it ended. Sinks receive them
//! synchronously on the request's task.

use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::client::OutcomeKind;
use crate::net::Route;
use crate::observability::Metrics;
use crate::resilience::CircuitState;

/// What happened on one attempt, or how a request finished.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptEvent {
    pub request_id: Uuid,
    pub route: Route,
    /// 1-based attempt number. For terminal events, the number of attempts made.
    pub attempt: u32,
    pub outcome: OutcomeKind,
    /// Attempt latency; for terminal events, time since the first attempt.
    #[serde(with = "duration_ms")]
    pub latency: Duration,
    /// Circuit state for the route right after the outcome was recorded.
    pub circuit_state: CircuitState,
    pub terminal: bool,
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Receiver of attempt events.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &AttemptEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn on_event(&self, _event: &AttemptEvent) {}
}

/// Logs every event through `tracing` and records attempt metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink {
    metrics: Metrics,
}

impl TracingEventSink {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }
}

impl EventSink for TracingEventSink {
    fn on_event(&self, event: &AttemptEvent) {
        if event.terminal {
            tracing::info!(
                request_id = %event.request_id,
                route = %event.route,
                attempts = event.attempt,
                outcome = %event.outcome,
                elapsed_ms = event.latency.as_millis() as u64,
                circuit = event.circuit_state.as_str(),
                "Request finished"
            );
        } else {
            self.metrics
                .record_attempt(&event.route, event.outcome.label(), event.latency);
            tracing::debug!(
                request_id = %event.request_id,
                route = %event.route,
                attempt = event.attempt,
                outcome = %event.outcome,
                latency_ms = event.latency.as_millis() as u64,
                circuit = event.circuit_state.as_str(),
                "Attempt finished"
            );
        }
    }
}
