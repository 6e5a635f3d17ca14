//! Client subsystem.
//!
//! # Data Flow
//! ```text
//! Request (method, URI, headers, body, declared idempotency)
//!     → executor.rs (admit → acquire → exchange → record → release → retry?)
//!     → outcome.rs (classify each attempt)
//!     → Response (head + fully read body) or ClientError
//! ```

pub mod executor;
pub mod outcome;
pub mod request;

pub use executor::RequestExecutor;
pub use outcome::{AttemptOutcome, FailureReason, OutcomeKind};
pub use request::{Idempotency, Request, RequestError, Response, IDEMPOTENCY_KEY};
