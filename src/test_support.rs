//! In-memory transport for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::client::Request;
use crate::net::{Connection, ResponseBody, Route, Transport, TransportError};

#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    connects: Arc<AtomicUsize>,
    connect_delay: Duration,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    type Connection = MockConnection;

    async fn connect(&self, _route: &Route) -> Result<MockConnection, TransportError> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            open: Arc::new(AtomicBool::new(true)),
        })
    }
}

pub(crate) struct MockConnection {
    open: Arc<AtomicBool>,
}

impl MockConnection {
    pub(crate) fn handle(&self) -> MockHandle {
        MockHandle {
            open: Arc::clone(&self.open),
        }
    }
}

/// Lets a test close a connection the pool currently owns.
pub(crate) struct MockHandle {
    open: Arc<AtomicBool>,
}

impl MockHandle {
    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

impl Connection for MockConnection {
    type Body = MockBody;

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send(
        &mut self,
        _request: &Request,
    ) -> Result<http::Response<MockBody>, TransportError> {
        Ok(http::Response::new(MockBody(Some(Bytes::from_static(b"ok")))))
    }
}

pub(crate) struct MockBody(Option<Bytes>);

impl ResponseBody for MockBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.0.take())
    }
}
