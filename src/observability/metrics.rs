//! Metrics collection.
//!
//! # Metrics
//! - `breaker_transitions_total` (counter): state transitions, labelled by target state
//! - `breaker_failures_total` (counter): failures reported by callers
//! - `breaker_connections` (gauge): currently tracked connections
//! - `breaker_events_dispatched_total` (counter): events fanned out, by type
//! - `breaker_subscribers_pruned_total` (counter): stale subscriptions dropped
//! - `breaker_sweep_removed_total` (counter): connections evicted for inactivity
//! - `breaker_sweep_half_opened_total` (counter): circuits moved to half-open by the sweep
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; installing an exporter is up to the application
//! - Without a recorder every call is a no-op

use crate::types::CircuitState;

pub const TRANSITIONS_TOTAL: &str = "breaker_transitions_total";
pub const FAILURES_TOTAL: &str = "breaker_failures_total";
pub const CONNECTIONS: &str = "breaker_connections";
pub const EVENTS_DISPATCHED_TOTAL: &str = "breaker_events_dispatched_total";
pub const SUBSCRIBERS_PRUNED_TOTAL: &str = "breaker_subscribers_pruned_total";
pub const SWEEP_REMOVED_TOTAL: &str = "breaker_sweep_removed_total";
pub const SWEEP_HALF_OPENED_TOTAL: &str = "breaker_sweep_half_opened_total";

pub fn record_transition(to: CircuitState) {
    ::metrics::counter!(TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
}

pub fn record_failure() {
    ::metrics::counter!(FAILURES_TOTAL).increment(1);
}

pub fn record_connection_count(count: usize) {
    ::metrics::gauge!(CONNECTIONS).set(count as f64);
}

pub fn record_event_dispatched(event_type: &'static str) {
    ::metrics::counter!(EVENTS_DISPATCHED_TOTAL, "event" => event_type).increment(1);
}

pub fn record_subscribers_pruned(count: usize) {
    if count > 0 {
        ::metrics::counter!(SUBSCRIBERS_PRUNED_TOTAL).increment(count as u64);
    }
}

pub fn record_sweep(removed: usize, half_opened: usize) {
    ::metrics::counter!(SWEEP_REMOVED_TOTAL).increment(removed as u64);
    ::metrics::counter!(SWEEP_HALF_OPENED_TOTAL).increment(half_opened as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            TRANSITIONS_TOTAL,
            FAILURES_TOTAL,
            CONNECTIONS,
            EVENTS_DISPATCHED_TOTAL,
            SUBSCRIBERS_PRUNED_TOTAL,
            SWEEP_REMOVED_TOTAL,
            SWEEP_HALF_OPENED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_transition(CircuitState::Open);
        record_connection_count(3);
        record_sweep(0, 1);
    }
}
