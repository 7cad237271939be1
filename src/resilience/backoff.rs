//! Open-duration calculation.
//!
//! Evaluated once, at the moment a circuit opens. Fixed connections keep
//! their stored expiry; progressive ones grow it geometrically with the
//! failure count up to `max_expiry_ms`.

use crate::resilience::circuit_breaker::ConnectionRecord;
use crate::types::ExpiryStrategy;

/// Expiry to use when `record` opens now.
pub fn expiry_for(record: &ConnectionRecord) -> u64 {
    match record.expiry_strategy {
        ExpiryStrategy::Fixed => record.expiry_ms,
        ExpiryStrategy::Progressive => progressive_expiry(
            record.initial_expiry_ms,
            record.backoff_factor,
            record.max_expiry_ms,
            record.failure_count,
        ),
    }
}

/// `min(max_ms, initial_ms * factor^failures)`, truncated to whole milliseconds.
pub fn progressive_expiry(initial_ms: u64, factor: f64, max_ms: u64, failures: u32) -> u64 {
    let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
    let delay = initial_ms as f64 * factor.powi(exponent);

    if delay.is_nan() {
        return max_ms;
    }

    // `as` saturates, so an infinite delay lands on u64::MAX before capping.
    (delay as u64).min(max_ms)
}
