//! Resilient HTTP client core.
//!
//! Outbound requests go through a [`RequestExecutor`] that combines a
//! route-keyed connection pool, per-route circuit breakers, layered
//! timeouts and an idempotency-aware retry policy.

pub mod client;
pub mod config;
pub mod error;
pub mod net;
pub mod observability;
pub mod pool;
pub mod resilience;

#[cfg(test)]
mod test_support;

pub use client::{AttemptOutcome, Idempotency, Request, RequestExecutor, Response};
pub use config::{load_config, ClientConfig, ConfigError};
pub use error::{ClientError, ErrorContext};
pub use net::{HttpTransport, Route, Transport};
pub use resilience::{CircuitState, RetryPolicy, TimeoutPhase};
