//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Executor, pool and circuit breaker produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//!     → events.rs (one AttemptEvent per attempt, handed to an EventSink)
//!
//! Consumers:
//!     → Any tracing subscriber (stdout by default)
//!     → Any metrics recorder installed by the application
//!     → Application-provided EventSink implementations
//! ```
//!
//! # Design Decisions
//! - Structured logging with request id and route on every attempt span
//! - Metrics are no-ops until a recorder is installed
//! - Event sinks are synchronous and must not block

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{AttemptEvent, EventSink, NoopEventSink, TracingEventSink};
pub use logging::{init_logging, LoggingError};
pub use self::metrics::Metrics;
