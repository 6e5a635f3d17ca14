//! Pooled connection wrapper and capacity reservations.
//!
//! # Responsibilities
//! - Track per-connection age, last use and use count
//! - Enforce `max_per_route` / `max_total` with lock-free check-and-increment
//! - Give capacity back when a connection is destroyed, however it is dropped

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::net::{Connection, ConnectionId, Route};

/// Lifecycle state of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// Owned by the pool, available for reuse.
    Idle,
    /// Owned by exactly one in-flight attempt.
    InUse,
    /// Failed validation; about to be destroyed.
    Stale,
}

/// Why a connection was judged unfit for reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    Closed,
    IdleTimeout,
    UseLimit,
    Failed,
    Evicted,
}

impl StaleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaleReason::Closed => "closed",
            StaleReason::IdleTimeout => "idle_timeout",
            StaleReason::UseLimit => "use_limit",
            StaleReason::Failed => "failed",
            StaleReason::Evicted => "evicted",
        }
    }
}

/// Shared pool-wide counters.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    /// Live connections across all routes (idle + in use + connecting).
    pub(crate) total: AtomicUsize,
    /// Woken whenever capacity may have become available.
    pub(crate) capacity_freed: Notify,
    pub(crate) created: AtomicU64,
    pub(crate) reused: AtomicU64,
    pub(crate) destroyed: AtomicU64,
}

/// Which bound refused a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Full {
    Route,
    Total,
}

/// A RAII claim on one unit of route and total capacity.
///
/// Taken before connecting and carried by the connection for its whole life;
/// dropping it is the only way capacity is returned.
#[derive(Debug)]
pub(crate) struct Reservation {
    counters: Arc<PoolCounters>,
    route_count: Arc<AtomicUsize>,
}

impl Reservation {
    /// Check-and-increment both counters, rolling back the route count if the
    /// global bound refuses.
    pub(crate) fn try_new(
        counters: &Arc<PoolCounters>,
        route_count: &Arc<AtomicUsize>,
        max_per_route: usize,
        max_total: usize,
    ) -> Result<Self, Full> {
        if !try_increment(route_count, max_per_route) {
            return Err(Full::Route);
        }
        if !try_increment(&counters.total, max_total) {
            route_count.fetch_sub(1, Ordering::AcqRel);
            return Err(Full::Total);
        }
        Ok(Self {
            counters: Arc::clone(counters),
            route_count: Arc::clone(route_count),
        })
    }
}

fn try_increment(counter: &AtomicUsize, max: usize) -> bool {
    let mut prev = counter.load(Ordering::Acquire);
    loop {
        if prev >= max {
            return false;
        }
        match counter.compare_exchange_weak(prev, prev + 1, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return true,
            Err(x) => prev = x,
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.route_count.fetch_sub(1, Ordering::AcqRel);
        self.counters.total.fetch_sub(1, Ordering::AcqRel);
        self.counters.capacity_freed.notify_waiters();
    }
}

/// One transport connection owned by the pool or by a single attempt.
///
/// Dereferences to the underlying transport connection.
pub struct PooledConnection<C> {
    id: ConnectionId,
    route: Route,
    created_at: Instant,
    last_used_at: Instant,
    use_count: u64,
    state: ConnectionState,
    inner: C,
    _reservation: Reservation,
}

impl<C: Connection> PooledConnection<C> {
    pub(crate) fn new(route: Route, inner: C, reservation: Reservation) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::next(),
            route,
            created_at: now,
            last_used_at: now,
            use_count: 0,
            state: ConnectionState::Idle,
            inner,
            _reservation: reservation,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    /// Number of attempts this connection has been handed to.
    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    /// Hand the connection to an attempt.
    pub(crate) fn check_out(&mut self) {
        self.state = ConnectionState::InUse;
        self.use_count += 1;
        self.last_used_at = Instant::now();
    }

    /// Return the connection to the idle set.
    pub(crate) fn check_in(&mut self) {
        self.state = ConnectionState::Idle;
        self.last_used_at = Instant::now();
    }

    pub(crate) fn mark_stale(&mut self) {
        self.state = ConnectionState::Stale;
    }

    /// First reason this connection may not be reused, if any.
    pub(crate) fn staleness(
        &self,
        idle_timeout: Duration,
        max_uses: Option<u64>,
    ) -> Option<StaleReason> {
        if !self.inner.is_open() {
            Some(StaleReason::Closed)
        } else if self.idle_for() >= idle_timeout {
            Some(StaleReason::IdleTimeout)
        } else if max_uses.is_some_and(|max| self.use_count >= max) {
            Some(StaleReason::UseLimit)
        } else {
            None
        }
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<C> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<C> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("route", &self.route)
            .field("use_count", &self.use_count)
            .field("state", &self.state)
            .finish()
    }
}
