//! Configuration schema definitions.
//!
//! `GlobalConfig` holds the defaults applied to connections that do not set
//! their own tunables, plus the timing of the background sweep. All fields
//! derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::types::ExpiryStrategy;

/// Process-wide breaker defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Consecutive failures before a circuit opens.
    /// `None` disables count-based opening.
    pub max_attempts: Option<u32>,

    /// How long an opened circuit stays open, in milliseconds.
    pub expiry_ms: u64,

    /// Interval between background sweeps, in milliseconds.
    pub cleanup_interval_ms: u64,

    /// Connections with no activity for this long are evicted, in milliseconds.
    pub inactive_threshold_ms: u64,

    /// Strategy given to connections registered without one.
    pub expiry_strategy: ExpiryStrategy,

    /// Growth factor given to progressive connections registered without one.
    pub backoff_factor: f64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            expiry_ms: 60_000,
            cleanup_interval_ms: 10_000,
            inactive_threshold_ms: 86_400_000, // 24 hours
            expiry_strategy: ExpiryStrategy::Fixed,
            backoff_factor: 2.0,
        }
    }
}
