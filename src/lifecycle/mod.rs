//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown::trigger()
//!     → manager task leaves its loop (pending callers get ManagerStopped)
//!     → dispatcher task stops fanning out
//!     → config update forwarder exits
//! ```
//!
//! # Design Decisions
//! - One broadcast channel shared by every background task
//! - Dropping the last handle also stops a task, so a coordinator is optional

pub mod shutdown;

pub use shutdown::{wait_for_shutdown, Shutdown};
