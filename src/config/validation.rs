//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, backoff factor >= 1)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GlobalConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::GlobalConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &GlobalConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.max_attempts == Some(0) {
        errors.push(ValidationError::new("max_attempts", "must be greater than 0"));
    }

    if config.cleanup_interval_ms == 0 {
        errors.push(ValidationError::new(
            "cleanup_interval_ms",
            "must be greater than 0",
        ));
    }

    if !config.backoff_factor.is_finite() || config.backoff_factor < 1.0 {
        errors.push(ValidationError::new(
            "backoff_factor",
            format!("must be a finite number >= 1.0, got {}", config.backoff_factor),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
