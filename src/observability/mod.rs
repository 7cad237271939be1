//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connection manager, dispatcher and sweep produce:
//!     → tracing events (structured fields: connection, scope, from, to)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, text or JSON)
//!     → whatever metrics recorder the application installs
//! ```
//!
//! # Design Decisions
//! - Transitions to Open log at warn, recovery at info, bookkeeping at debug
//! - Metrics are cheap (no-ops without a recorder)

pub mod logging;
pub mod metrics;
