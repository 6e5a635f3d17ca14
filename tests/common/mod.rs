//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Instant;

use resilient_client::client::Request;
use resilient_client::config::ClientConfig;
use resilient_client::net::{Connection, ResponseBody, Route, Transport, TransportError};
use resilient_client::observability::{AttemptEvent, EventSink};

/// What the scripted server does with one request.
#[derive(Debug, Clone)]
pub enum Step {
    /// Respond with a status, headers, and body chunks each sent after a delay.
    Respond {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        chunks: Vec<(Duration, &'static [u8])>,
    },
    /// Wait before sending the response head.
    Delayed(Duration, u16),
    /// Never answer.
    Stall,
    /// Drop the connection.
    Reset,
}

impl Step {
    pub fn status(status: u16) -> Self {
        Step::Respond {
            status,
            headers: Vec::new(),
            chunks: vec![(Duration::ZERO, b"body")],
        }
    }

    pub fn with_header(status: u16, name: &'static str, value: &'static str) -> Self {
        Step::Respond {
            status,
            headers: vec![(name, value)],
            chunks: Vec::new(),
        }
    }

    pub fn chunked(status: u16, chunks: Vec<(Duration, &'static [u8])>) -> Self {
        Step::Respond {
            status,
            headers: Vec::new(),
            chunks,
        }
    }
}

/// A request as seen by the scripted server.
#[derive(Debug, Clone)]
pub struct Seen {
    pub at: Instant,
    pub route: Route,
    pub idempotency_key: Option<String>,
}

#[derive(Default)]
struct Shared {
    script: Mutex<VecDeque<Step>>,
    fallback: Mutex<Option<Step>>,
    connect_delay: Mutex<Duration>,
    connects: AtomicUsize,
    seen: Mutex<Vec<Seen>>,
    live: Mutex<HashMap<Route, usize>>,
    live_total: AtomicUsize,
    peak_route: Mutex<HashMap<Route, usize>>,
    peak_total: AtomicUsize,
}

/// In-memory transport that plays back a script of responses and records
/// what it saw.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    shared: Arc<Shared>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `steps` in order, then `fallback` (200 if unset) forever.
    pub fn script(steps: impl IntoIterator<Item = Step>) -> Self {
        let transport = Self::new();
        transport.push(steps);
        transport
    }

    pub fn push(&self, steps: impl IntoIterator<Item = Step>) {
        self.shared.script.lock().unwrap().extend(steps);
    }

    pub fn always(self, step: Step) -> Self {
        *self.shared.fallback.lock().unwrap() = Some(step);
        self
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *self.shared.connect_delay.lock().unwrap() = delay;
        self
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.shared.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.shared.seen.lock().unwrap().clone()
    }

    /// Gaps between consecutive sends.
    pub fn gaps(&self) -> Vec<Duration> {
        let seen = self.seen();
        seen.windows(2).map(|w| w[1].at - w[0].at).collect()
    }

    pub fn peak_total(&self) -> usize {
        self.shared.peak_total.load(Ordering::SeqCst)
    }

    pub fn peak_for(&self, route: &Route) -> usize {
        self.shared.peak_route.lock().unwrap().get(route).copied().unwrap_or(0)
    }

    fn next_step(&self) -> Step {
        if let Some(step) = self.shared.script.lock().unwrap().pop_front() {
            return step;
        }
        self.shared
            .fallback
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Step::status(200))
    }
}

impl Transport for ScriptedTransport {
    type Connection = ScriptedConnection;

    async fn connect(&self, route: &Route) -> Result<ScriptedConnection, TransportError> {
        let delay = *self.shared.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.shared.connects.fetch_add(1, Ordering::SeqCst);

        let total = self.shared.live_total.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.peak_total.fetch_max(total, Ordering::SeqCst);
        let per_route = {
            let mut live = self.shared.live.lock().unwrap();
            let count = live.entry(route.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let mut peaks = self.shared.peak_route.lock().unwrap();
        let peak = peaks.entry(route.clone()).or_insert(0);
        *peak = (*peak).max(per_route);

        Ok(ScriptedConnection {
            transport: self.clone(),
            route: route.clone(),
            open: true,
        })
    }
}

pub struct ScriptedConnection {
    transport: ScriptedTransport,
    route: Route,
    open: bool,
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        let shared = &self.transport.shared;
        shared.live_total.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = shared.live.lock().unwrap().get_mut(&self.route) {
            *count -= 1;
        }
    }
}

impl Connection for ScriptedConnection {
    type Body = ScriptedBody;

    fn is_open(&self) -> bool {
        self.open
    }

    async fn send(
        &mut self,
        request: &Request,
    ) -> Result<http::Response<ScriptedBody>, TransportError> {
        let idempotency_key = match request.idempotency() {
            resilient_client::Idempotency::Keyed(key) => Some(key.clone()),
            _ => None,
        };
        self.transport.shared.seen.lock().unwrap().push(Seen {
            at: Instant::now(),
            route: self.route.clone(),
            idempotency_key,
        });

        match self.transport.next_step() {
            Step::Respond { status, headers, chunks } => {
                let mut builder = http::Response::builder().status(status);
                for (name, value) in headers {
                    builder = builder.header(name, value);
                }
                Ok(builder.body(ScriptedBody { chunks: chunks.into() }).unwrap())
            }
            Step::Delayed(delay, status) => {
                tokio::time::sleep(delay).await;
                Ok(http::Response::builder()
                    .status(status)
                    .body(ScriptedBody { chunks: VecDeque::new() })
                    .unwrap())
            }
            Step::Stall => std::future::pending().await,
            Step::Reset => {
                self.open = false;
                Err(TransportError::Closed("connection reset by peer".into()))
            }
        }
    }
}

pub struct ScriptedBody {
    chunks: VecDeque<(Duration, &'static [u8])>,
}

impl ResponseBody for ScriptedBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.chunks.pop_front() {
            Some((delay, data)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(Some(Bytes::from_static(data)))
            }
            None => Ok(None),
        }
    }
}

/// Event sink that keeps every event.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<AttemptEvent>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<AttemptEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for CollectingSink {
    fn on_event(&self, event: &AttemptEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Config with short, test-friendly timeouts and backoff.
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.timeouts.connect_ms = 500;
    config.timeouts.read_ms = 1_000;
    config.timeouts.total_ms = 5_000;
    config.retries.max_attempts = 3;
    config.retries.base_delay_ms = 100;
    config.retries.max_delay_ms = 1_000;
    config.retries.max_elapsed_ms = 60_000;
    config.circuit_breaker.failure_threshold = 5;
    config.circuit_breaker.volume_threshold = 5;
    config.pool.pool_wait_timeout_ms = 1_000;
    config
}

/// Start a TCP backend answering each connection once with the status and
/// body produced by `f`, then closing.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        if read_head(&mut socket).await.is_none() {
                            return;
                        }
                        let (status, body) = f().await;
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_line(status),
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Start a keep-alive TCP backend that answers every request on a
/// connection with `200 OK` and the connection's serial number as the body.
pub async fn start_keepalive_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let serial = counter.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::spawn(async move {
                while read_head(&mut socket).await.is_some() {
                    let body = serial.to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    if socket.write_all(response.as_bytes()).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    (addr, accepted)
}

/// Read one request head (bodyless requests only).
async fn read_head(socket: &mut tokio::net::TcpStream) -> Option<()> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => buf.push(byte[0]),
        }
    }
    Some(())
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        404 => "404 Not Found",
        429 => "429 Too Many Requests",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    }
}
