//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, bounds consistent)
//! - Enforce the timeout hierarchy `connect ≤ read ≤ total`
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before any component is constructed

use crate::config::schema::{
    CircuitBreakerConfig, ClientConfig, ObservabilityConfig, PoolConfig, RetryConfig, TimeoutConfig,
};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("timeouts out of order: connect {connect_ms}ms, read {read_ms}ms, total {total_ms}ms")]
    TimeoutOrdering {
        connect_ms: u64,
        read_ms: u64,
        total_ms: u64,
    },

    #[error("pool.max_per_route ({max_per_route}) exceeds pool.max_total ({max_total})")]
    PoolBounds { max_per_route: usize, max_total: usize },

    #[error("retries.base_delay_ms ({base_ms}) exceeds retries.max_delay_ms ({max_ms})")]
    BackoffBounds { base_ms: u64, max_ms: u64 },

    #[error("unknown log level: {0}")]
    LogLevel(String),
}

/// Validate the whole configuration, collecting every error.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_pool(&config.pool, &mut errors);
    check_circuit_breaker(&config.circuit_breaker, &mut errors);
    check_retries(&config.retries, &mut errors);
    check_timeouts(&config.timeouts, &mut errors);
    check_observability(&config.observability, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the timeout hierarchy on its own.
pub fn validate_timeouts(timeouts: &TimeoutConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_timeouts(timeouts, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn non_zero(value: u64, field: &'static str, errors: &mut Vec<ValidationError>) {
    if value == 0 {
        errors.push(ValidationError::Zero { field });
    }
}

fn check_pool(pool: &PoolConfig, errors: &mut Vec<ValidationError>) {
    non_zero(pool.max_per_route as u64, "pool.max_per_route", errors);
    non_zero(pool.max_total as u64, "pool.max_total", errors);
    non_zero(pool.idle_timeout_ms, "pool.idle_timeout_ms", errors);
    non_zero(pool.sweep_interval_ms, "pool.sweep_interval_ms", errors);
    if let Some(uses) = pool.max_uses_per_connection {
        non_zero(uses, "pool.max_uses_per_connection", errors);
    }
    if pool.max_per_route > pool.max_total {
        errors.push(ValidationError::PoolBounds {
            max_per_route: pool.max_per_route,
            max_total: pool.max_total,
        });
    }
}

fn check_circuit_breaker(cb: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    non_zero(cb.failure_threshold as u64, "circuit_breaker.failure_threshold", errors);
    non_zero(cb.success_threshold as u64, "circuit_breaker.success_threshold", errors);
    non_zero(cb.half_open_max_probes as u64, "circuit_breaker.half_open_max_probes", errors);
    non_zero(cb.sleep_window_ms, "circuit_breaker.sleep_window_ms", errors);
}

fn check_retries(retries: &RetryConfig, errors: &mut Vec<ValidationError>) {
    non_zero(retries.max_attempts as u64, "retries.max_attempts", errors);
    non_zero(retries.max_elapsed_ms, "retries.max_elapsed_ms", errors);
    if retries.base_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::BackoffBounds {
            base_ms: retries.base_delay_ms,
            max_ms: retries.max_delay_ms,
        });
    }
}

fn check_timeouts(timeouts: &TimeoutConfig, errors: &mut Vec<ValidationError>) {
    non_zero(timeouts.connect_ms, "timeouts.connect_ms", errors);
    non_zero(timeouts.read_ms, "timeouts.read_ms", errors);
    non_zero(timeouts.total_ms, "timeouts.total_ms", errors);
    if timeouts.connect_ms > timeouts.read_ms || timeouts.read_ms > timeouts.total_ms {
        errors.push(ValidationError::TimeoutOrdering {
            connect_ms: timeouts.connect_ms,
            read_ms: timeouts.read_ms,
            total_ms: timeouts.total_ms,
        });
    }
}

fn check_observability(obs: &ObservabilityConfig, errors: &mut Vec<ValidationError>) {
    match obs.log_level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => {}
        _ => errors.push(ValidationError::LogLevel(obs.log_level.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ClientConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ClientConfig::default();
        config.pool.max_per_route = 50;
        config.pool.max_total = 10;
        config.retries.max_attempts = 0;
        config.timeouts.connect_ms = 40_000;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::PoolBounds {
            max_per_route: 50,
            max_total: 10
        }));
        assert!(errors.contains(&ValidationError::Zero {
            field: "retries.max_attempts"
        }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::TimeoutOrdering { .. })));
    }

    #[test]
    fn read_longer_than_total_is_rejected() {
        let timeouts = TimeoutConfig {
            connect_ms: 100,
            read_ms: 5_000,
            total_ms: 1_000,
        };
        assert_eq!(
            validate_timeouts(&timeouts),
            Err(vec![ValidationError::TimeoutOrdering {
                connect_ms: 100,
                read_ms: 5_000,
                total_ms: 1_000,
            }])
        );
    }

    #[test]
    fn equal_timeouts_are_allowed() {
        let timeouts = TimeoutConfig {
            connect_ms: 1_000,
            read_ms: 1_000,
            total_ms: 1_000,
        };
        assert!(validate_timeouts(&timeouts).is_ok());
    }
}
