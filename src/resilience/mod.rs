//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt to a route:
//!     → circuit_breaker.rs (admit or fail fast; record the outcome afterwards)
//!     → timeouts.rs (connect / rolling read / total deadlines)
//!     → On failure: retries.rs (eligible? budget left? delay from backoff.rs)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every attempt has a total deadline
//! - Retries only for requests declared idempotent or carrying a key
//! - Circuit state is per route, never global
//! - Each component is usable on its own and composed by the executor

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{
    Admission, CircuitBreaker, CircuitOpenError, CircuitSignal, CircuitState, CircuitStats,
};
pub use retries::{RetryDecision, RetryPolicy, RetryState, StopReason};
pub use timeouts::{AttemptDeadline, Interrupt, TimeoutManager, TimeoutPhase};
