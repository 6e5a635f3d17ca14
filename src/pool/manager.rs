//! Route-keyed connection pool.
//!
//! # Responsibilities
//! - Hand out at most one caller per connection
//! - Reuse idle connections per route, validating them first
//! - Create new connections within `max_per_route` / `max_total`
//! - Block callers up to `pool_wait_timeout` when the pool is full
//! - Periodically sweep idle connections past `idle_timeout`
//!
//! # Design Decisions
//! - State is sharded by route (DashMap of per-route slots); there is no
//!   pool-wide lock
//! - Capacity is a RAII reservation, so a connection dropped on a cancelled
//!   or panicking path still gives its slot back
//! - Idle reuse is LIFO to keep the warmest connection busy and let the
//!   oldest ones age out
//! - When only the global bound blocks, one idle connection of another route
//!   is evicted to make room

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::client::AttemptOutcome;
use crate::config::PoolConfig;
use crate::net::{Route, Transport, TransportError};
use crate::observability::Metrics;
use crate::pool::connection::{Full, PoolCounters, PooledConnection, Reservation, StaleReason};

/// No capacity became available within `pool_wait_timeout`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("connection pool exhausted for {route} after waiting {waited:?}")]
pub struct PoolExhaustedError {
    pub route: Route,
    pub waited: Duration,
}

/// Reasons `acquire` can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    #[error(transparent)]
    Exhausted(#[from] PoolExhaustedError),

    #[error("connect timed out")]
    ConnectTimeout,

    #[error(transparent)]
    Connect(#[from] TransportError),

    #[error("acquire cancelled")]
    Cancelled,
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Live connections (idle + in use + connecting).
    pub total: usize,
    /// Idle connections across all routes.
    pub idle: usize,
    /// Connections created since start.
    pub created: u64,
    /// Idle connections handed out again.
    pub reused: u64,
    /// Connections destroyed since start.
    pub destroyed: u64,
}

struct RouteSlot<C> {
    count: Arc<AtomicUsize>,
    idle: Mutex<Vec<PooledConnection<C>>>,
    idle_ready: Notify,
}

impl<C> RouteSlot<C> {
    fn new() -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            idle: Mutex::new(Vec::new()),
            idle_ready: Notify::new(),
        }
    }

    fn idle(&self) -> std::sync::MutexGuard<'_, Vec<PooledConnection<C>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A claim taken by [`ConnectionPool::checkout`]: either an idle connection
/// or capacity reserved for a new one. Dropping it unused gives the claim
/// back.
pub struct Checkout<C> {
    route: Route,
    claim: Claim<C>,
}

enum Claim<C> {
    Idle(PooledConnection<C>),
    Reserved(Reservation),
}

impl<C> Checkout<C> {
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Whether an idle connection was claimed, so no connect is needed.
    pub fn is_reused(&self) -> bool {
        matches!(self.claim, Claim::Idle(_))
    }
}

impl<C> std::fmt::Debug for Checkout<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkout")
            .field("route", &self.route)
            .field("reused", &self.is_reused())
            .finish()
    }
}

struct PoolInner<T: Transport> {
    transport: T,
    config: PoolConfig,
    metrics: Metrics,
    routes: DashMap<Route, Arc<RouteSlot<T::Connection>>>,
    counters: Arc<PoolCounters>,
}

/// Connection pool shared by all requests of an executor.
///
/// Cloning is cheap; clones share the same connections.
pub struct ConnectionPool<T: Transport> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Transport> Clone for ConnectionPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> ConnectionPool<T> {
    /// Create a pool. Call [`ConnectionPool::spawn_sweeper`] to enable the
    /// background idle sweep.
    pub fn new(transport: T, config: PoolConfig) -> Self {
        Self::with_metrics(transport, config, Metrics::default())
    }

    pub fn with_metrics(transport: T, config: PoolConfig, metrics: Metrics) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                transport,
                config,
                metrics,
                routes: DashMap::new(),
                counters: Arc::new(PoolCounters::default()),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get a connection for `route`: a validated idle one, a freshly
    /// connected one, or whichever becomes available within
    /// `pool_wait_timeout`.
    pub async fn acquire(
        &self,
        route: &Route,
        connect_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<PooledConnection<T::Connection>, AcquireError> {
        let checkout = self.checkout(route, cancel).await?;
        self.connect(checkout, connect_timeout, cancel).await
    }

    /// Claim a connection or capacity for a new one on `route`, waiting up to
    /// `pool_wait_timeout`. Only the wait and `cancel` bound this call.
    pub async fn checkout(
        &self,
        route: &Route,
        cancel: &CancellationToken,
    ) -> Result<Checkout<T::Connection>, AcquireError> {
        let slot = self.slot(route);
        let started = Instant::now();
        let wait_until = started + self.inner.config.pool_wait_timeout();

        loop {
            // Register interest before checking so a release between the
            // check and the await is not lost.
            let idle_ready = slot.idle_ready.notified();
            let capacity = self.inner.counters.capacity_freed.notified();
            tokio::pin!(idle_ready);
            tokio::pin!(capacity);
            idle_ready.as_mut().enable();
            capacity.as_mut().enable();

            if let Some(conn) = self.take_idle(&slot) {
                return Ok(Checkout {
                    route: route.clone(),
                    claim: Claim::Idle(conn),
                });
            }
            if let Some(reservation) = self.reserve(route, &slot) {
                return Ok(Checkout {
                    route: route.clone(),
                    claim: Claim::Reserved(reservation),
                });
            }

            tracing::trace!(route = %route, "Pool full, waiting for a connection");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AcquireError::Cancelled),
                _ = &mut idle_ready => {}
                _ = &mut capacity => {}
                _ = time::sleep_until(wait_until) => {
                    let waited = started.elapsed();
                    self.inner.metrics.record_pool_exhausted(route);
                    tracing::warn!(route = %route, waited = ?waited, "Connection pool exhausted");
                    return Err(PoolExhaustedError {
                        route: route.clone(),
                        waited,
                    }
                    .into());
                }
            }
        }
    }

    /// Turn a checkout into a usable connection. A reused connection is
    /// returned as is; reserved capacity is connected within
    /// `connect_timeout`.
    pub async fn connect(
        &self,
        checkout: Checkout<T::Connection>,
        connect_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<PooledConnection<T::Connection>, AcquireError> {
        let Checkout { route, claim } = checkout;
        let reservation = match claim {
            Claim::Idle(conn) => return Ok(conn),
            Claim::Reserved(reservation) => reservation,
        };

        let connect = time::timeout(connect_timeout, self.inner.transport.connect(&route));
        let inner = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AcquireError::Cancelled),
            result = connect => match result {
                Err(_) => {
                    tracing::debug!(
                        route = %route,
                        timeout = ?connect_timeout,
                        "Connect timed out"
                    );
                    return Err(AcquireError::ConnectTimeout);
                }
                Ok(Err(e)) => {
                    tracing::debug!(route = %route, error = %e, "Connect failed");
                    return Err(AcquireError::Connect(e));
                }
                Ok(Ok(conn)) => conn,
            },
        };

        self.inner.counters.created.fetch_add(1, Ordering::Relaxed);
        self.inner.metrics.record_pool_connection_created(&route);
        let mut conn = PooledConnection::new(route, inner, reservation);
        conn.check_out();
        tracing::debug!(
            route = %conn.route(),
            connection_id = %conn.id(),
            route_count = self.route_count(conn.route()),
            total = self.inner.counters.total.load(Ordering::Relaxed),
            "Created new connection"
        );
        Ok(conn)
    }

    /// Return a connection after an attempt. It is kept only if the exchange
    /// left it clean and it is still within its limits.
    pub fn release(&self, mut conn: PooledConnection<T::Connection>, outcome: &AttemptOutcome) {
        let reason = if outcome.leaves_connection_reusable() {
            conn.staleness(
                self.inner.config.idle_timeout(),
                self.inner.config.max_uses_per_connection,
            )
        } else {
            Some(StaleReason::Failed)
        };

        if let Some(reason) = reason {
            self.destroy(conn, reason);
            return;
        }

        let slot = self.slot(conn.route());
        conn.check_in();
        tracing::trace!(
            route = %conn.route(),
            connection_id = %conn.id(),
            "Connection returned to pool"
        );
        slot.idle().push(conn);
        slot.idle_ready.notify_one();
        // Waiters on other routes may now evict this one.
        self.inner.counters.capacity_freed.notify_waiters();
    }

    /// Destroy idle connections past `idle_timeout` or closed by the peer.
    /// Returns the number destroyed.
    pub fn sweep(&self) -> usize {
        let idle_timeout = self.inner.config.idle_timeout();
        let mut stale = Vec::new();
        for entry in self.inner.routes.iter() {
            let mut idle = entry.value().idle();
            let mut i = 0;
            while i < idle.len() {
                match idle[i].staleness(idle_timeout, None) {
                    Some(reason) => stale.push((idle.remove(i), reason)),
                    None => i += 1,
                }
            }
        }

        let removed = stale.len();
        for (conn, reason) in stale {
            self.destroy(conn, reason);
        }
        if removed > 0 {
            tracing::debug!(removed, "Swept idle connections");
        }
        self.prune_routes();
        removed
    }

    /// Forget routes with no live connections and nobody holding their slot.
    /// A slot is only cloned under the map's shard lock, which `retain` holds,
    /// so a slot in use by an acquirer is never dropped.
    fn prune_routes(&self) {
        self.inner.routes.retain(|route, slot| {
            let keep = Arc::strong_count(slot) > 1
                || slot.count.load(Ordering::Acquire) > 0
                || !slot.idle().is_empty();
            if !keep {
                tracing::trace!(route = %route, "Dropping unused route slot");
            }
            keep
        });
    }

    /// Routes the pool currently tracks.
    pub fn tracked_routes(&self) -> usize {
        self.inner.routes.len()
    }

    /// Run [`ConnectionPool::sweep`] every `sweep_interval` until `shutdown`
    /// fires or the pool is dropped.
    pub fn spawn_sweeper(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let weak: Weak<PoolInner<T>> = Arc::downgrade(&self.inner);
        let interval = self.inner.config.sweep_interval();

        tokio::spawn(async move {
            tracing::info!(interval = ?interval, "Pool sweeper starting");
            let mut ticker = time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        ConnectionPool { inner }.sweep();
                    }
                    _ = shutdown.cancelled() => {
                        tracing::info!("Pool sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }

    /// Live connections (idle + in use) for one route.
    pub fn route_count(&self, route: &Route) -> usize {
        self.inner
            .routes
            .get(route)
            .map(|slot| slot.count.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Idle connections for one route.
    pub fn idle_count(&self, route: &Route) -> usize {
        self.inner
            .routes
            .get(route)
            .map(|slot| slot.idle().len())
            .unwrap_or(0)
    }

    /// Live connections across all routes.
    pub fn total_count(&self) -> usize {
        self.inner.counters.total.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        let counters = &self.inner.counters;
        PoolStats {
            total: counters.total.load(Ordering::Acquire),
            idle: self.inner.routes.iter().map(|slot| slot.idle().len()).sum(),
            created: counters.created.load(Ordering::Relaxed),
            reused: counters.reused.load(Ordering::Relaxed),
            destroyed: counters.destroyed.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, route: &Route) -> Arc<RouteSlot<T::Connection>> {
        if let Some(slot) = self.inner.routes.get(route) {
            return Arc::clone(slot.value());
        }
        Arc::clone(
            self.inner
                .routes
                .entry(route.clone())
                .or_insert_with(|| Arc::new(RouteSlot::new()))
                .value(),
        )
    }

    /// Pop the most recently used valid idle connection, destroying stale ones
    /// found on the way.
    fn take_idle(
        &self,
        slot: &RouteSlot<T::Connection>,
    ) -> Option<PooledConnection<T::Connection>> {
        let idle_timeout = self.inner.config.idle_timeout();
        let max_uses = self.inner.config.max_uses_per_connection;
        let mut stale = Vec::new();

        let found = {
            let mut idle = slot.idle();
            loop {
                let Some(conn) = idle.pop() else { break None };
                match conn.staleness(idle_timeout, max_uses) {
                    None => break Some(conn),
                    Some(reason) => stale.push((conn, reason)),
                }
            }
        };

        for (conn, reason) in stale {
            self.destroy(conn, reason);
        }

        let mut conn = found?;
        conn.check_out();
        self.inner.counters.reused.fetch_add(1, Ordering::Relaxed);
        self.inner.metrics.record_pool_connection_reused(conn.route());
        tracing::trace!(
            route = %conn.route(),
            connection_id = %conn.id(),
            use_count = conn.use_count(),
            "Reusing connection"
        );
        Some(conn)
    }

    fn reserve(&self, route: &Route, slot: &RouteSlot<T::Connection>) -> Option<Reservation> {
        let config = &self.inner.config;
        loop {
            match Reservation::try_new(
                &self.inner.counters,
                &slot.count,
                config.max_per_route,
                config.max_total,
            ) {
                Ok(reservation) => return Some(reservation),
                Err(Full::Route) => return None,
                Err(Full::Total) => {
                    if !self.evict_idle_elsewhere(route) {
                        return None;
                    }
                }
            }
        }
    }

    /// Destroy the oldest idle connection of some other route.
    fn evict_idle_elsewhere(&self, route: &Route) -> bool {
        let victim = self
            .inner
            .routes
            .iter()
            .filter(|entry| entry.key() != route)
            .find_map(|entry| {
                let mut idle = entry.value().idle();
                if idle.is_empty() {
                    None
                } else {
                    Some(idle.remove(0))
                }
            });

        match victim {
            Some(conn) => {
                self.destroy(conn, StaleReason::Evicted);
                true
            }
            None => false,
        }
    }

    fn destroy(&self, mut conn: PooledConnection<T::Connection>, reason: StaleReason) {
        conn.mark_stale();
        self.inner.counters.destroyed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .metrics
            .record_pool_connection_destroyed(conn.route(), reason.as_str());
        tracing::debug!(
            route = %conn.route(),
            connection_id = %conn.id(),
            use_count = conn.use_count(),
            reason = reason.as_str(),
            "Destroying connection"
        );
        // Dropping the connection releases its reservation.
        drop(conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::AttemptOutcome;
    use crate::test_support::{MockConnection, MockTransport};

    fn config(max_per_route: usize, max_total: usize) -> PoolConfig {
        PoolConfig {
            max_per_route,
            max_total,
            idle_timeout_ms: 1_000,
            pool_wait_timeout_ms: 200,
            max_uses_per_connection: Some(3),
            sweep_interval_ms: 100,
        }
    }

    fn ok() -> AttemptOutcome {
        AttemptOutcome::Success(http::Response::new(bytes::Bytes::new()))
    }

    fn route(port: u16) -> Route {
        Route::parse(&format!("http://backend:{port}")).unwrap()
    }

    async fn acquire(
        pool: &ConnectionPool<MockTransport>,
        route: &Route,
    ) -> Result<PooledConnection<MockConnection>, AcquireError> {
        pool.acquire(route, Duration::from_millis(50), &CancellationToken::new()).await
    }

    #[tokio::test(start_paused = true)]
    async fn released_connection_is_reused() {
        let transport = MockTransport::new();
        let pool = ConnectionPool::new(transport.clone(), config(2, 4));
        let r = route(1);

        let conn = acquire(&pool, &r).await.unwrap();
        let first_id = conn.id();
        assert_eq!(conn.use_count(), 1);
        pool.release(conn, &ok());
        assert_eq!(pool.idle_count(&r), 1);

        let conn = acquire(&pool, &r).await.unwrap();
        assert_eq!(conn.id(), first_id);
        assert_eq!(conn.use_count(), 2);
        assert_eq!(transport.connects(), 1);
        assert_eq!(pool.stats().reused, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempt_destroys_connection() {
        let pool = ConnectionPool::new(MockTransport::new(), config(2, 4));
        let r = route(1);

        let conn = acquire(&pool, &r).await.unwrap();
        assert_eq!(pool.route_count(&r), 1);
        pool.release(conn, &AttemptOutcome::Timeout(crate::resilience::TimeoutPhase::Read));
        assert_eq!(pool.route_count(&r), 0);
        assert_eq!(pool.total_count(), 0);
        assert_eq!(pool.stats().destroyed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn use_limit_retires_connection() {
        let transport = MockTransport::new();
        let pool = ConnectionPool::new(transport.clone(), config(1, 1));
        let r = route(1);

        for _ in 0..3 {
            let conn = acquire(&pool, &r).await.unwrap();
            pool.release(conn, &ok());
        }
        // Third use hit the limit of 3, so the connection was not kept.
        assert_eq!(pool.idle_count(&r), 0);
        let conn = acquire(&pool, &r).await.unwrap();
        assert_eq!(conn.use_count(), 1);
        assert_eq!(transport.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_is_checked_on_acquire() {
        let transport = MockTransport::new();
        let pool = ConnectionPool::new(transport.clone(), config(2, 4));
        let r = route(1);

        let conn = acquire(&pool, &r).await.unwrap();
        let first_id = conn.id();
        pool.release(conn, &ok());

        time::advance(Duration::from_millis(1_500)).await;
        let conn = acquire(&pool, &r).await.unwrap();
        assert_ne!(conn.id(), first_id);
        assert_eq!(transport.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_idle_connection_is_not_reused() {
        let transport = MockTransport::new();
        let pool = ConnectionPool::new(transport.clone(), config(2, 4));
        let r = route(1);

        let conn = acquire(&pool, &r).await.unwrap();
        let handle = conn.handle();
        pool.release(conn, &ok());
        handle.close();

        let conn = acquire(&pool, &r).await.unwrap();
        assert_eq!(conn.use_count(), 1);
        assert_eq!(transport.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_pool_times_out() {
        let pool = ConnectionPool::new(MockTransport::new(), config(1, 4));
        let r = route(1);

        let _held = acquire(&pool, &r).await.unwrap();
        let err = acquire(&pool, &r).await.unwrap_err();
        match err {
            AcquireError::Exhausted(e) => {
                assert_eq!(e.route, r);
                assert!(e.waited >= Duration::from_millis(200));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_gets_released_connection() {
        let pool = ConnectionPool::new(MockTransport::new(), config(1, 4));
        let r = route(1);

        let held = acquire(&pool, &r).await.unwrap();
        let held_id = held.id();

        let waiter = {
            let pool = pool.clone();
            let r = r.clone();
            tokio::spawn(async move { acquire(&pool, &r).await })
        };
        time::sleep(Duration::from_millis(50)).await;
        pool.release(held, &ok());

        let conn = waiter.await.unwrap().unwrap();
        assert_eq!(conn.id(), held_id);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_is_cancellable() {
        let pool = ConnectionPool::new(MockTransport::new(), config(1, 4));
        let r = route(1);
        let _held = acquire(&pool, &r).await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let err = pool.acquire(&r, Duration::from_millis(50), &cancel).await.unwrap_err();
        assert_eq!(err, AcquireError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn global_bound_evicts_idle_of_other_route() {
        let pool = ConnectionPool::new(MockTransport::new(), config(2, 2));
        let (a, b) = (route(1), route(2));

        let a1 = acquire(&pool, &a).await.unwrap();
        let a2 = acquire(&pool, &a).await.unwrap();
        pool.release(a1, &ok());

        let b1 = acquire(&pool, &b).await.unwrap();
        assert_eq!(pool.route_count(&a), 1);
        assert_eq!(pool.route_count(&b), 1);
        assert_eq!(pool.total_count(), 2);
        drop((a2, b1));
        assert_eq!(pool.total_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_frees_reservation() {
        let transport = MockTransport::new().with_connect_delay(Duration::from_secs(5));
        let pool = ConnectionPool::new(transport, config(1, 1));
        let r = route(1);

        let err = acquire(&pool, &r).await.unwrap_err();
        assert_eq!(err, AcquireError::ConnectTimeout);
        assert_eq!(pool.total_count(), 0);
        assert_eq!(pool.route_count(&r), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_destroys_expired_idle_connections() {
        let pool = ConnectionPool::new(MockTransport::new(), config(2, 4));
        let r = route(1);

        let c1 = acquire(&pool, &r).await.unwrap();
        let c2 = acquire(&pool, &r).await.unwrap();
        pool.release(c1, &ok());
        time::advance(Duration::from_millis(800)).await;
        pool.release(c2, &ok());
        time::advance(Duration::from_millis(300)).await;

        assert_eq!(pool.sweep(), 1);
        assert_eq!(pool.idle_count(&r), 1);
        assert_eq!(pool.total_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_runs_until_shutdown() {
        let pool = ConnectionPool::new(MockTransport::new(), config(2, 4));
        let r = route(1);
        let shutdown = CancellationToken::new();
        let sweeper = pool.spawn_sweeper(shutdown.clone());

        let conn = acquire(&pool, &r).await.unwrap();
        pool.release(conn, &ok());
        time::sleep(Duration::from_millis(1_250)).await;
        assert_eq!(pool.total_count(), 0);

        shutdown.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn checkout_holds_capacity_until_connected_or_dropped() {
        let transport = MockTransport::new();
        let pool = ConnectionPool::new(transport.clone(), config(1, 1));
        let r = route(1);
        let cancel = CancellationToken::new();

        let checkout = pool.checkout(&r, &cancel).await.unwrap();
        assert!(!checkout.is_reused());
        assert_eq!(pool.route_count(&r), 1);
        assert_eq!(transport.connects(), 0);
        drop(checkout);
        assert_eq!(pool.route_count(&r), 0);

        let checkout = pool.checkout(&r, &cancel).await.unwrap();
        let conn = pool.connect(checkout, Duration::from_millis(50), &cancel).await.unwrap();
        pool.release(conn, &ok());

        let checkout = pool.checkout(&r, &cancel).await.unwrap();
        assert!(checkout.is_reused());
        let conn = pool.connect(checkout, Duration::ZERO, &cancel).await.unwrap();
        assert_eq!(conn.use_count(), 2);
        assert_eq!(transport.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_forgets_routes_without_connections() {
        let pool = ConnectionPool::new(MockTransport::new(), config(2, 4));
        let (a, b) = (route(1), route(2));

        let conn = acquire(&pool, &a).await.unwrap();
        pool.release(conn, &AttemptOutcome::Timeout(crate::resilience::TimeoutPhase::Read));
        let kept = acquire(&pool, &b).await.unwrap();
        assert_eq!(pool.tracked_routes(), 2);

        pool.sweep();
        assert_eq!(pool.tracked_routes(), 1);
        assert_eq!(pool.route_count(&b), 1);

        pool.release(kept, &ok());
        pool.sweep();
        assert_eq!(pool.tracked_routes(), 1);
        assert_eq!(pool.idle_count(&b), 1);
    }
}
