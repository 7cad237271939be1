//! Connection health tracking and circuit breaking.
//!
//! Tracks named external dependencies (APIs, databases, services), stops an
//! application from calling one that is known to be failing, and probes for
//! recovery once its circuit expires. Every state change is published to
//! filtered subscribers.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller ──register/success/failure/...──▶ ┌──────────────────────┐
//!          ◀──────── reply (oneshot) ─────── │  ConnectionManager   │◀── sweep timer
//!                                            │  (single owner task) │
//!                                            └──────────┬───────────┘
//!                                                       │ dispatch (non-blocking)
//!                                                       ▼
//!                                            ┌──────────────────────┐
//!                                            │   EventDispatcher    │
//!                                            │   (fan-out task)     │
//!                                            └──────────┬───────────┘
//!                                                       │ filter match
//!                                                       ▼
//!                                                 Subscriptions
//! ```
//!
//! # Example
//!
//! ```no_run
//! use connection_breaker::{ConnectionManager, ConnectionOptions, EventFilter, EventType, GlobalConfig};
//!
//! # async fn example() -> Result<(), connection_breaker::BreakerError> {
//! let manager = ConnectionManager::spawn(GlobalConfig::default());
//! let mut opened = manager.subscribe(EventFilter::all().event_types([EventType::CircuitOpened]))?;
//!
//! manager.register("payments-api", ConnectionOptions::new().max_attempts(3)).await?;
//!
//! if manager.is_available("payments-api").await {
//!     // make the call, then report the outcome
//!     manager.failure("payments-api", Some("connection refused".into())).await?;
//! }
//!
//! if let Some(event) = opened.recv().await {
//!     println!("{} opened", event.connection_id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod events;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod types;

pub use config::GlobalConfig;
pub use events::{Event, EventData, EventDispatcher, EventFilter, EventType, Subscription, SubscriptionId};
pub use lifecycle::Shutdown;
pub use resilience::{ConfigureOptions, ConnectionManager, ConnectionOptions, ConnectionRecord, SweepReport};
pub use types::{BreakerError, BreakerResult, CircuitState, ConnectionKey, ExpiryStrategy, Metadata};
