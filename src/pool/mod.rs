//! Connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! acquire(route)
//!     → idle connection for route? validate (open, idle age, use count) → reuse
//!     → capacity under max_per_route and max_total? reserve → connect
//!     → otherwise wait for release/capacity up to pool_wait_timeout
//! release(conn, outcome)
//!     → clean exchange and still fit? back to idle set
//!     → otherwise destroy (reservation drop frees capacity)
//! ```

pub mod connection;
pub mod manager;

pub use connection::{ConnectionState, PooledConnection, StaleReason};
pub use manager::{AcquireError, Checkout, ConnectionPool, PoolExhaustedError, PoolStats};
