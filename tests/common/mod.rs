//! Shared utilities for integration tests.

use std::time::Duration;

use connection_breaker::{ConnectionManager, Event, GlobalConfig, Subscription};

/// Sweep interval long enough that only explicit `sweep()` calls run it.
pub const MANUAL_SWEEP_MS: u64 = 3_600_000;

/// Start a manager whose timer never fires during a test.
pub fn manual_sweep_manager() -> ConnectionManager {
    ConnectionManager::spawn(GlobalConfig {
        cleanup_interval_ms: MANUAL_SWEEP_MS,
        inactive_threshold_ms: 10 * MANUAL_SWEEP_MS,
        ..GlobalConfig::default()
    })
}

/// Receive the next event or fail the test.
pub async fn next_event(subscription: &mut Subscription) -> Event {
    tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("timed out waiting for event")
        .expect("dispatcher stopped")
}

/// Drain everything already delivered.
#[allow(dead_code)]
pub fn drain(subscription: &mut Subscription) -> Vec<Event> {
    std::iter::from_fn(|| subscription.try_recv()).collect()
}
