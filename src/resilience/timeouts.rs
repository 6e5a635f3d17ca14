//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound each attempt by a total deadline
//! - Bound connect by `min(connect, remaining total)`
//! - Bound every read (response head, each body chunk) by a rolling window
//! - Stop waiting as soon as the caller cancels
//!
//! # Design Decisions
//! - Uses Tokio's timer; tests drive it with a paused clock
//! - The read window restarts after every chunk, so a slow but steady body
//!   succeeds while a stalled one fails
//! - When a phase window and the total deadline coincide, the total wins

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::validation::validate_timeouts;
use crate::config::{ConfigError, TimeoutConfig, ValidationError};

/// Which deadline fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TimeoutPhase {
    Connect,
    Read,
    Total,
}

impl TimeoutPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutPhase::Connect => "connect",
            TimeoutPhase::Read => "read",
            TimeoutPhase::Total => "total",
        }
    }
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a guarded future did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Timeout(TimeoutPhase),
    Cancelled,
}

/// Per-phase timeout budgets, validated so `connect ≤ read ≤ total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutManager {
    connect: Duration,
    read: Duration,
    total: Duration,
}

impl TimeoutManager {
    /// Build from exact durations. Sub-millisecond values are kept as given.
    pub fn new(connect: Duration, read: Duration, total: Duration) -> Result<Self, ConfigError> {
        let mut errors = Vec::new();
        for (value, field) in [
            (connect, "timeouts.connect"),
            (read, "timeouts.read"),
            (total, "timeouts.total"),
        ] {
            if value.is_zero() {
                errors.push(ValidationError::Zero { field });
            }
        }
        if connect > read || read > total {
            errors.push(ValidationError::TimeoutOrdering {
                connect_ms: millis(connect),
                read_ms: millis(read),
                total_ms: millis(total),
            });
        }
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }
        Ok(Self {
            connect,
            read,
            total,
        })
    }

    pub fn from_config(config: &TimeoutConfig) -> Result<Self, ConfigError> {
        validate_timeouts(config).map_err(ConfigError::Validation)?;
        Ok(Self {
            connect: config.connect(),
            read: config.read(),
            total: config.total(),
        })
    }

    pub fn connect(&self) -> Duration {
        self.connect
    }

    pub fn read(&self) -> Duration {
        self.read
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    /// Start the clock for one attempt.
    pub fn start(&self, cancel: &CancellationToken) -> AttemptDeadline {
        let started = Instant::now();
        AttemptDeadline {
            started,
            total_at: started + self.total,
            connect: self.connect,
            read: self.read,
            cancel: cancel.clone(),
        }
    }

    /// Run one attempt under a fresh deadline. `f` receives the deadline so it
    /// can apply the connect and read windows to its own phases.
    pub async fn run_attempt<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<T, Interrupt>
    where
        F: FnOnce(AttemptDeadline) -> Fut,
        Fut: Future<Output = Result<T, Interrupt>>,
    {
        let deadline = self.start(cancel);
        let guard = deadline.clone();
        guard.run(f(deadline)).await?
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// The deadlines of a single attempt.
#[derive(Debug, Clone)]
pub struct AttemptDeadline {
    started: Instant,
    total_at: Instant,
    connect: Duration,
    read: Duration,
    cancel: CancellationToken,
}

impl AttemptDeadline {
    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the total deadline.
    pub fn remaining(&self) -> Duration {
        self.total_at.saturating_duration_since(Instant::now())
    }

    /// Connect budget: the connect timeout, capped by what is left of total.
    pub fn connect_timeout(&self) -> Duration {
        self.connect.min(self.remaining())
    }

    /// Race `fut` against the total deadline and cancellation.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            out = fut => Ok(out),
            _ = time::sleep_until(self.total_at) => Err(Interrupt::Timeout(TimeoutPhase::Total)),
        }
    }

    /// Race a connect against the connect window, capped by the total deadline.
    pub async fn connect<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        self.within(self.connect, TimeoutPhase::Connect, fut).await
    }

    /// Race one read against a fresh read window, capped by the total deadline.
    pub async fn read<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        self.within(self.read, TimeoutPhase::Read, fut).await
    }

    async fn within<F: Future>(
        &self,
        window: Duration,
        phase: TimeoutPhase,
        fut: F,
    ) -> Result<F::Output, Interrupt> {
        let window_end = Instant::now() + window;
        let (until, phase) = if window_end >= self.total_at {
            (self.total_at, TimeoutPhase::Total)
        } else {
            (window_end, phase)
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            out = fut => Ok(out),
            _ = time::sleep_until(until) => Err(Interrupt::Timeout(phase)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(connect: u64, read: u64, total: u64) -> TimeoutManager {
        TimeoutManager::new(
            Duration::from_millis(connect),
            Duration::from_millis(read),
            Duration::from_millis(total),
        )
        .unwrap()
    }

    #[test]
    fn rejects_inverted_hierarchy() {
        let err = TimeoutManager::new(
            Duration::from_secs(5),
            Duration::from_secs(1),
            Duration::from_secs(10),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn keeps_sub_millisecond_durations() {
        let manager = TimeoutManager::new(
            Duration::from_micros(500),
            Duration::from_micros(900),
            Duration::from_millis(2),
        )
        .unwrap();
        assert_eq!(manager.connect(), Duration::from_micros(500));
        assert_eq!(manager.read(), Duration::from_micros(900));

        let err = TimeoutManager::new(
            Duration::ZERO,
            Duration::from_micros(1),
            Duration::from_secs(1),
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert_eq!(errors, vec![ValidationError::Zero { field: "timeouts.connect" }]);
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn read_window_rolls_per_chunk() {
        let deadline = manager(100, 1_000, 10_000).start(&CancellationToken::new());

        // Five chunks 800ms apart: each under the 1s window, 4s in total.
        for _ in 0..5 {
            let got = deadline.read(time::sleep(Duration::from_millis(800))).await;
            assert_eq!(got, Ok(()));
        }
        assert!(deadline.elapsed() >= Duration::from_millis(4_000));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_read_times_out() {
        let deadline = manager(100, 1_000, 10_000).start(&CancellationToken::new());
        let got = deadline.read(time::sleep(Duration::from_millis(1_500))).await;
        assert_eq!(got, Err(Interrupt::Timeout(TimeoutPhase::Read)));
    }

    #[tokio::test(start_paused = true)]
    async fn total_caps_rolling_reads() {
        let deadline = manager(100, 1_000, 2_000).start(&CancellationToken::new());

        assert!(deadline.read(time::sleep(Duration::from_millis(900))).await.is_ok());
        assert!(deadline.read(time::sleep(Duration::from_millis(900))).await.is_ok());
        // 200ms left of total; the read window would end later.
        let got = deadline.read(time::sleep(Duration::from_millis(900))).await;
        assert_eq!(got, Err(Interrupt::Timeout(TimeoutPhase::Total)));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_budget_shrinks_with_remaining_total() {
        let deadline = manager(500, 1_000, 1_200).start(&CancellationToken::new());
        assert_eq!(deadline.connect_timeout(), Duration::from_millis(500));
        time::advance(Duration::from_millis(1_000)).await;
        assert_eq!(deadline.connect_timeout(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_connect_reports_connect_phase() {
        let deadline = manager(500, 1_000, 10_000).start(&CancellationToken::new());
        let got = deadline.connect(time::sleep(Duration::from_secs(2))).await;
        assert_eq!(got, Err(Interrupt::Timeout(TimeoutPhase::Connect)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_promptly() {
        let cancel = CancellationToken::new();
        let deadline = manager(100, 1_000, 10_000).start(&cancel);
        let trigger = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let got = deadline.run(time::sleep(Duration::from_secs(5))).await;
        assert_eq!(got, Err(Interrupt::Cancelled));
        assert!(deadline.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn run_attempt_applies_total() {
        let timeouts = manager(100, 1_000, 3_000);
        let got: Result<(), Interrupt> = timeouts
            .run_attempt(&CancellationToken::new(), |deadline| async move {
                loop {
                    deadline.read(time::sleep(Duration::from_millis(500))).await?;
                }
            })
            .await;
        assert_eq!(got, Err(Interrupt::Timeout(TimeoutPhase::Total)));
    }
}
