//! Transport seam.
//!
//! # Responsibilities
//! - Open a connection to a route
//! - Send one request per call over an open connection
//! - Stream the response body chunk by chunk so read deadlines can be
//!   enforced per chunk
//!
//! # Design Decisions
//! - The core only depends on the traits; [`HttpTransport`] is the
//!   production implementation (hyper HTTP/1.1 over tokio TCP)
//! - Futures are dropped on timeout or cancellation, which tears down the
//!   in-flight I/O at the next await point
//! - Errors are plain data (`Clone`) so they can travel inside outcomes

use std::future::Future;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::client::Request;
use crate::net::route::{Route, Scheme};

/// Transport-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connect to {route} failed: {message}")]
    Connect { route: String, message: String },

    #[error("connection closed by peer: {0}")]
    Closed(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("scheme {0} is not supported by this transport")]
    UnsupportedScheme(String),
}

impl TransportError {
    /// Connection-level trouble is transient; malformed exchanges are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Connect { .. } | TransportError::Closed(_) | TransportError::Io(_)
        )
    }

    fn from_hyper(err: hyper::Error) -> Self {
        if err.is_parse() || err.is_user() {
            TransportError::Protocol(err.to_string())
        } else if err.is_closed() || err.is_canceled() || err.is_incomplete_message() {
            TransportError::Closed(err.to_string())
        } else {
            TransportError::Io(err.to_string())
        }
    }
}

/// Opens connections to routes.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;

    fn connect(
        &self,
        route: &Route,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// One open transport connection.
pub trait Connection: Send + 'static {
    type Body: ResponseBody;

    /// Cheap liveness probe used before handing an idle connection out again.
    fn is_open(&self) -> bool;

    /// Send the request and resolve once the response head has arrived.
    fn send(
        &mut self,
        request: &Request,
    ) -> impl Future<Output = Result<http::Response<Self::Body>, TransportError>> + Send;
}

/// A streaming response body.
pub trait ResponseBody: Send {
    /// Next data chunk, or `None` at end of body.
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Bytes>, TransportError>> + Send;
}

/// Plain HTTP/1.1 transport built on hyper.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    nodelay: bool,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self { nodelay: true }
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    type Connection = HttpConnection;

    async fn connect(&self, route: &Route) -> Result<HttpConnection, TransportError> {
        if route.scheme() != Scheme::Http {
            return Err(TransportError::UnsupportedScheme(route.scheme().as_str().to_string()));
        }

        let stream = TcpStream::connect(route.authority())
            .await
            .map_err(|e| TransportError::Connect {
                route: route.to_string(),
                message: e.to_string(),
            })?;
        stream
            .set_nodelay(self.nodelay)
            .map_err(|e| TransportError::Io(e.to_string()))?;

        let (sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| TransportError::Connect {
                route: route.to_string(),
                message: e.to_string(),
            })?;

        // Connection driver; ends when the sender is dropped or the peer closes.
        let driver_route = route.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(
                    route = %driver_route,
                    error = %e,
                    "HTTP/1 connection closed with error"
                );
            }
        });

        Ok(HttpConnection {
            sender,
            route: route.clone(),
        })
    }
}

/// An HTTP/1.1 connection opened by [`HttpTransport`].
pub struct HttpConnection {
    sender: http1::SendRequest<Full<Bytes>>,
    route: Route,
}

impl std::fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection")
            .field("route", &self.route)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl Connection for HttpConnection {
    type Body = Incoming;

    fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn send(
        &mut self,
        request: &Request,
    ) -> Result<http::Response<Incoming>, TransportError> {
        self.sender.ready().await.map_err(TransportError::from_hyper)?;
        let outbound = request
            .to_http(&self.route)
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        self.sender
            .send_request(outbound)
            .await
            .map_err(TransportError::from_hyper)
    }
}

impl ResponseBody for Incoming {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.frame().await {
                None => return Ok(None),
                Some(Ok(frame)) => {
                    // Trailers carry no data; keep reading.
                    if let Ok(data) = frame.into_data() {
                        return Ok(Some(data));
                    }
                }
                Some(Err(e)) => return Err(TransportError::from_hyper(e)),
            }
        }
    }
}
