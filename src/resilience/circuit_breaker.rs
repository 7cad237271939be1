//! Circuit breaker state for a single connection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: one probe allowed to test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= max_attempts
//! Open → Half-Open: expiry elapsed since opened_at (driven by the sweep)
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails, regardless of failure_count
//! ```
//!
//! Records are plain data owned by the manager task. Every method takes the
//! current time explicitly, so the transitions are deterministic and can be
//! tested without a runtime.

use serde::Serialize;

use crate::config::GlobalConfig;
use crate::resilience::backoff;
use crate::resilience::types::{ConfigureOptions, ConnectionOptions};
use crate::types::{BreakerError, BreakerResult, CircuitState, ConnectionKey, ExpiryStrategy, Metadata};

/// Metadata key holding the reason given with the most recent failure.
pub const LAST_FAILURE_REASON: &str = "last_failure_reason";

/// Snapshot of one tracked connection. All timestamps are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRecord {
    pub identifier: String,
    pub scope: Option<String>,
    pub state: CircuitState,
    pub failure_count: u32,
    pub max_attempts: Option<u32>,
    pub expiry_ms: u64,
    pub expiry_strategy: ExpiryStrategy,
    pub initial_expiry_ms: u64,
    pub max_expiry_ms: u64,
    pub backoff_factor: f64,
    pub registered_at: u64,
    pub opened_at: Option<u64>,
    pub last_success_time: Option<u64>,
    pub last_failure_time: Option<u64>,
    pub metadata: Metadata,
}

/// What an outcome report did to the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The circuit (re)opened.
    Opened { from: CircuitState },
    /// The circuit closed after a successful probe.
    Closed { from: CircuitState },
    /// Counters changed, state did not.
    Recorded,
}

impl ConnectionRecord {
    /// Create a Closed record, filling unset options from `config`.
    pub fn new(key: ConnectionKey, options: ConnectionOptions, config: &GlobalConfig, now: u64) -> Self {
        let expiry_ms = options.expiry_ms.unwrap_or(config.expiry_ms);

        Self {
            identifier: key.identifier,
            scope: key.scope,
            state: CircuitState::Closed,
            failure_count: 0,
            max_attempts: options.max_attempts.unwrap_or(config.max_attempts),
            expiry_ms,
            expiry_strategy: options.expiry_strategy.unwrap_or(config.expiry_strategy),
            initial_expiry_ms: options.initial_expiry_ms.unwrap_or(expiry_ms),
            max_expiry_ms: options
                .max_expiry_ms
                .unwrap_or_else(|| expiry_ms.saturating_mul(10)),
            backoff_factor: options.backoff_factor.unwrap_or(config.backoff_factor),
            registered_at: now,
            opened_at: None,
            last_success_time: None,
            last_failure_time: None,
            metadata: options.metadata,
        }
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey {
            identifier: self.identifier.clone(),
            scope: self.scope.clone(),
        }
    }

    /// Calls may go through unless the circuit is open.
    pub fn is_available(&self) -> bool {
        self.state != CircuitState::Open
    }

    pub fn record_success(&mut self, now: u64) -> Outcome {
        self.failure_count = 0;
        self.last_success_time = Some(now);

        if self.state == CircuitState::HalfOpen {
            self.state = CircuitState::Closed;
            Outcome::Closed { from: CircuitState::HalfOpen }
        } else {
            Outcome::Recorded
        }
    }

    pub fn record_failure(&mut self, now: u64, reason: Option<&str>) -> Outcome {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_time = Some(now);
        if let Some(reason) = reason {
            self.metadata
                .insert(LAST_FAILURE_REASON.to_string(), reason.into());
        }

        let from = self.state;
        let threshold_reached = self
            .max_attempts
            .is_some_and(|max| self.failure_count >= max);

        // A failed half-open probe is conclusive.
        if from == CircuitState::HalfOpen || threshold_reached {
            self.open(now, None);
            Outcome::Opened { from }
        } else {
            Outcome::Recorded
        }
    }

    /// Open the circuit. Without an explicit expiry the strategy picks one.
    /// Returns the previous state.
    pub fn open(&mut self, now: u64, expiry_ms: Option<u64>) -> CircuitState {
        let from = self.state;
        self.expiry_ms = expiry_ms.unwrap_or_else(|| backoff::expiry_for(self));
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        from
    }

    /// Force Closed, keeping the failure count. Returns the previous state.
    pub fn close(&mut self) -> CircuitState {
        std::mem::replace(&mut self.state, CircuitState::Closed)
    }

    /// Force Closed and clear the failure count. Returns the previous state.
    pub fn reset(&mut self) -> CircuitState {
        self.failure_count = 0;
        self.close()
    }

    pub fn half_open(&mut self) -> CircuitState {
        std::mem::replace(&mut self.state, CircuitState::HalfOpen)
    }

    /// Update tunables. Changing the expiry without an explicit maximum resets
    /// the maximum to ten times the new expiry.
    pub fn apply(&mut self, options: &ConfigureOptions) {
        if let Some(max_attempts) = options.max_attempts {
            self.max_attempts = max_attempts;
        }
        if let Some(expiry) = options.expiry_ms {
            self.expiry_ms = expiry;
            if options.max_expiry_ms.is_none() {
                self.max_expiry_ms = expiry.saturating_mul(10);
            }
        }
        if let Some(strategy) = options.expiry_strategy {
            self.expiry_strategy = strategy;
        }
        if let Some(initial) = options.initial_expiry_ms {
            self.initial_expiry_ms = initial;
        }
        if let Some(max) = options.max_expiry_ms {
            self.max_expiry_ms = max;
        }
        if let Some(factor) = options.backoff_factor {
            self.backoff_factor = factor;
        }
    }

    /// Progressive expiry must be able to start at its initial value.
    pub fn check_expiry_bounds(&self) -> BreakerResult<()> {
        if self.max_expiry_ms < self.initial_expiry_ms {
            return Err(BreakerError::InvalidOptions(format!(
                "max_expiry_ms ({}) is below initial_expiry_ms ({}) for {}",
                self.max_expiry_ms,
                self.initial_expiry_ms,
                self.key()
            )));
        }
        Ok(())
    }

    /// Latest moment anything happened to this connection.
    pub fn last_activity(&self) -> u64 {
        [self.last_success_time, self.last_failure_time, self.opened_at]
            .into_iter()
            .flatten()
            .fold(self.registered_at, u64::max)
    }

    pub fn is_inactive(&self, now: u64, threshold_ms: u64) -> bool {
        now.saturating_sub(self.last_activity()) > threshold_ms
    }

    /// Open long enough to allow a probe.
    pub fn is_expired(&self, now: u64) -> bool {
        self.state == CircuitState::Open
            && self
                .opened_at
                .is_some_and(|opened| now.saturating_sub(opened) >= self.expiry_ms)
    }
}
