//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Caller reports an outcome:
//!     → manager.rs (serialized owner task, one request at a time)
//!     → circuit_breaker.rs (count failures, apply transition rules)
//!     → backoff.rs (pick the open duration when a circuit opens)
//!     → events dispatcher (one notification per state-affecting operation)
//!
//! Sweep timer fires (every cleanup_interval_ms):
//!     → sweep.rs (evict inactive connections, half-open expired circuits)
//!     → events dispatcher
//! ```
//!
//! # Design Decisions
//! - One owner for all records: read-modify-write sequences are atomic
//! - Records are plain data; callers only ever see copies
//! - The sweep runs on the owner task, so it never races an operation or itself
//! - Backoff applies to when a circuit may next be probed, not to the call

pub mod backoff;
pub mod circuit_breaker;
pub mod manager;
pub mod sweep;
pub mod types;

pub use circuit_breaker::{ConnectionRecord, LAST_FAILURE_REASON};
pub use manager::ConnectionManager;
pub use sweep::SweepReport;
pub use types::{ConfigureOptions, ConnectionOptions};
