//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for applications embedding the breaker
//! - Configure log level from `RUST_LOG`, falling back to a default directive
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Initialisation is fallible instead of panicking when a subscriber already exists

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use tracing_subscriber::util::TryInitError;

/// Default directive when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "connection_breaker=info";

/// Install a global subscriber. `RUST_LOG` takes precedence over `directive`.
pub fn init_logging(directive: &str, json: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| directive.into());

    let json_layer = json.then(|| fmt::layer().json());
    let text_layer = (!json).then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
}
