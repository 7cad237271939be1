//! Event notification subsystem.
//!
//! # Data Flow
//! ```text
//! ConnectionManager (after each mutation)
//!     → dispatcher.rs dispatch() (stamp, queue, return immediately)
//!     → fan-out task
//!     → filter.rs (event type AND connection AND scope)
//!     → Subscription channels
//! ```
//!
//! # Design Decisions
//! - Payloads are a tagged union keyed by what the operation produced
//! - Delivery failures are never reported to the dispatching side
//! - Subscriptions live as long as their receiving end

pub mod dispatcher;
pub mod filter;
pub mod types;

pub use dispatcher::{EventDispatcher, Subscription, SubscriptionId};
pub use filter::EventFilter;
pub use types::{Event, EventData, EventType};
