//! Network layer.
//!
//! # Data Flow
//! ```text
//! Request URI
//!     → route.rs (scheme + host + port key)
//!     → transport.rs (connect, send, stream body)
//!     → connection.rs (unique ids for pooled connections)
//! ```
//!
//! # Design Decisions
//! - Route is the single key for pooling and circuit state
//! - Transport is a trait so the core can run over mocks in tests
//! - Plain HTTP/1.1 only in the bundled transport; TLS belongs to a custom
//!   `Transport` implementation

pub mod connection;
pub mod route;
pub mod transport;

pub use connection::ConnectionId;
pub use route::{Route, RouteError, Scheme};
pub use transport::{
    Connection, HttpConnection, HttpTransport, ResponseBody, Transport, TransportError,
};
