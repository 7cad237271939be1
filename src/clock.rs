//! Millisecond timestamps for connection records and events.
//!
//! Wall-clock time is sampled once when the clock is created and then
//! advanced with `tokio::time::Instant`. Timestamps therefore never go
//! backwards, and paused-time tests move them with `tokio::time::advance`.

use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Monotonic clock reporting milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
    origin_ms: u64,
}

impl Clock {
    /// Create a clock anchored at the current time.
    pub fn new() -> Self {
        let origin_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            origin: Instant::now(),
            origin_ms,
        }
    }

    /// Current time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.origin_ms
            .saturating_add(self.origin.elapsed().as_millis() as u64)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
