//! Event definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{CircuitState, ExpiryStrategy};

/// Kind of notification emitted by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Registration,
    ConnectionUnregistered,
    ConnectionConfigured,
    ConnectionRemoved,
    Success,
    Failure,
    CircuitOpened,
    CircuitClosed,
    CircuitHalfOpened,
    CircuitReset,
}

impl EventType {
    pub const ALL: [EventType; 10] = [
        EventType::Registration,
        EventType::ConnectionUnregistered,
        EventType::ConnectionConfigured,
        EventType::ConnectionRemoved,
        EventType::Success,
        EventType::Failure,
        EventType::CircuitOpened,
        EventType::CircuitClosed,
        EventType::CircuitHalfOpened,
        EventType::CircuitReset,
    ];

    /// Events that report a circuit state change.
    pub const STATE_CHANGES: [EventType; 4] = [
        EventType::CircuitOpened,
        EventType::CircuitClosed,
        EventType::CircuitHalfOpened,
        EventType::CircuitReset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Registration => "registration",
            EventType::ConnectionUnregistered => "connection_unregistered",
            EventType::ConnectionConfigured => "connection_configured",
            EventType::ConnectionRemoved => "connection_removed",
            EventType::Success => "success",
            EventType::Failure => "failure",
            EventType::CircuitOpened => "circuit_opened",
            EventType::CircuitClosed => "circuit_closed",
            EventType::CircuitHalfOpened => "circuit_half_opened",
            EventType::CircuitReset => "circuit_reset",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an event, shaped by the operation that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventData {
    /// A connection was registered with these effective settings.
    Registered {
        max_attempts: Option<u32>,
        expiry_ms: u64,
        expiry_strategy: ExpiryStrategy,
    },
    /// A connection's tunables changed.
    Configured {
        max_attempts: Option<u32>,
        expiry_ms: u64,
        expiry_strategy: ExpiryStrategy,
    },
    /// A connection was dropped by the caller or by the sweep.
    Removed {
        state: CircuitState,
        failure_count: u32,
        last_activity: u64,
    },
    SuccessRecorded {
        state: CircuitState,
    },
    FailureRecorded {
        reason: Option<String>,
        count: u32,
    },
    StateChanged {
        previous: CircuitState,
        new: CircuitState,
        reason: Option<String>,
        failure_count: u32,
        /// Open duration chosen when the new state is Open.
        expiry_ms: Option<u64>,
    },
}

/// Immutable notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub event_type: EventType,
    /// Milliseconds since the Unix epoch, non-decreasing.
    pub timestamp: u64,
    pub connection_id: String,
    pub scope: Option<String>,
    pub data: EventData,
}
