//! Exponential backoff with full jitter.

use std::time::Duration;

use rand::Rng;

/// Upper bound of the backoff window for the `attempt`-th attempt (1-based):
/// `min(cap, base · 2^(attempt−1))`.
pub fn backoff_ceiling(attempt: u32, base: Duration, cap: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis() as u64;
    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    Duration::from_millis(delay_ms.min(cap.as_millis() as u64))
}

/// Full-jitter delay: uniform in `(0, backoff_ceiling]`, at millisecond
/// resolution. Never zero unless the ceiling is.
pub fn full_jitter(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let ceiling_ms = backoff_ceiling(attempt, base, cap).as_millis() as u64;
    if ceiling_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(1..=ceiling_ms))
}
