//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client core.
//! All types derive Serde traits for deserialization from config files, and every
//! default is a public `Default` impl so nothing is hidden from the caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the client core.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection pool bounds and staleness limits.
    pub pool: PoolConfig,

    /// Per-route circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum live connections (idle + in use) per route.
    pub max_per_route: usize,

    /// Maximum live connections across all routes.
    pub max_total: usize,

    /// Idle connections older than this are destroyed, in milliseconds.
    pub idle_timeout_ms: u64,

    /// How long `acquire` waits for capacity before giving up, in milliseconds.
    pub pool_wait_timeout_ms: u64,

    /// Destroy a connection once it has served this many attempts.
    /// `None` means unlimited.
    pub max_uses_per_connection: Option<u64>,

    /// Interval of the background idle sweep, in milliseconds.
    pub sweep_interval_ms: u64,
}

impl PoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn pool_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_wait_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_per_route: 10,
            max_total: 100,
            idle_timeout_ms: 90_000,
            pool_wait_timeout_ms: 5_000,
            max_uses_per_connection: Some(1_000),
            sweep_interval_ms: 30_000,
        }
    }
}

/// Circuit breaker configuration, applied to every route.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive qualifying failures before the circuit opens.
    pub failure_threshold: u32,

    /// Minimum outcomes observed since the circuit last closed before it may open.
    pub volume_threshold: u32,

    /// Time spent Open before a probe is admitted, in milliseconds.
    pub sleep_window_ms: u64,

    /// Probe successes in Half-Open needed to close the circuit.
    pub success_threshold: u32,

    /// Concurrent probes admitted while Half-Open.
    pub half_open_max_probes: u32,

    /// Whether pool exhaustion counts as a downstream failure.
    pub count_pool_exhaustion: bool,
}

impl CircuitBreakerConfig {
    pub fn sleep_window(&self) -> Duration {
        Duration::from_millis(self.sleep_window_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            volume_threshold: 10,
            sleep_window_ms: 30_000,
            success_threshold: 2,
            half_open_max_probes: 1,
            count_pool_exhaustion: false,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Total time budget for one logical request, in milliseconds.
    pub max_elapsed_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_elapsed_ms: 120_000,
        }
    }
}

/// Timeout configuration for a single attempt.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Maximum silence between response chunks in milliseconds.
    pub read_ms: u64,

    /// Whole-attempt deadline in milliseconds.
    pub total_ms: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }

    pub fn total(&self) -> Duration {
        Duration::from_millis(self.total_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 2_000,
            read_ms: 10_000,
            total_ms: 30_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Record `metrics` counters and histograms for each attempt.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}
