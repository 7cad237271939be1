//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (GlobalConfig::default)
//!     → loader.rs (optional TOML file, then BREAKER_* env overrides)
//!     → validation.rs (semantic checks)
//!     → ConnectionManager::spawn (initial global defaults)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs reloads the file and re-applies BREAKER_* overrides
//!     → validation.rs validates
//!     → configure(None, ..) merges it into the running manager
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A config that fails to load or validate never replaces the current one

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_config_with_env, load_config_with_lookup, ConfigError};
pub use schema::GlobalConfig;
pub use validation::ValidationError;
pub use watcher::{apply_config_updates, ConfigWatcher};
