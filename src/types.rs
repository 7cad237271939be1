//! Shared vocabulary: connection keys, circuit states and errors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-supplied annotations attached to a connection.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Composite key of a tracked connection.
///
/// A connection without a scope is keyed by its identifier alone, so
/// `("db", None)` and `("db", Some("eu"))` are two different connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub identifier: String,
    pub scope: Option<String>,
}

impl ConnectionKey {
    /// Key for an unscoped connection.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            scope: None,
        }
    }

    /// Key for a connection inside `scope`.
    pub fn scoped(identifier: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            scope: Some(scope.into()),
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}/{}", scope, self.identifier),
            None => write!(f, "{}", self.identifier),
        }
    }
}

impl From<&str> for ConnectionKey {
    fn from(identifier: &str) -> Self {
        Self::new(identifier)
    }
}

impl From<String> for ConnectionKey {
    fn from(identifier: String) -> Self {
        Self::new(identifier)
    }
}

impl From<(&str, &str)> for ConnectionKey {
    fn from((identifier, scope): (&str, &str)) -> Self {
        Self::scoped(identifier, scope)
    }
}

impl From<&ConnectionKey> for ConnectionKey {
    fn from(key: &ConnectionKey) -> Self {
        key.clone()
    }
}

/// State of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are blocked until the circuit expires.
    Open,
    /// A probe call is allowed to test recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the open duration is chosen when a circuit opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryStrategy {
    /// Always use the stored expiry.
    #[default]
    Fixed,
    /// Grow the expiry geometrically with the failure count, up to a cap.
    Progressive,
}

/// Errors returned by the breaker API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BreakerError {
    /// The operation referenced a connection that is not registered.
    #[error("connection {0} is not registered")]
    NotFound(ConnectionKey),

    /// A connection with the same identifier and scope already exists.
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionKey),

    /// A subscription filter was rejected.
    #[error("invalid event filter: {0}")]
    InvalidFilter(String),

    /// Registration or configuration options were rejected.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The connection manager task is no longer running.
    #[error("connection manager is not running")]
    ManagerStopped,
}

/// Result type for breaker operations.
pub type BreakerResult<T> = Result<T, BreakerError>;
