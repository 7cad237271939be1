//! Registration and configuration options.

use crate::config::GlobalConfig;
use crate::types::{BreakerError, BreakerResult, ExpiryStrategy, Metadata};

/// Options accepted by `register`. Unset fields fall back to `GlobalConfig`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionOptions {
    /// `Some(None)` registers a connection that never opens from its failure count.
    pub max_attempts: Option<Option<u32>>,
    pub expiry_ms: Option<u64>,
    pub expiry_strategy: Option<ExpiryStrategy>,
    pub initial_expiry_ms: Option<u64>,
    /// Defaults to ten times the expiry.
    pub max_expiry_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub metadata: Metadata,
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(Some(attempts));
        self
    }

    /// Never open this connection from its failure count.
    pub fn unlimited_attempts(mut self) -> Self {
        self.max_attempts = Some(None);
        self
    }

    pub fn expiry_ms(mut self, expiry_ms: u64) -> Self {
        self.expiry_ms = Some(expiry_ms);
        self
    }

    /// Progressive backoff: `min(max_expiry, initial_expiry * factor^failures)`.
    pub fn progressive(mut self, initial_expiry_ms: u64, backoff_factor: f64, max_expiry_ms: u64) -> Self {
        self.expiry_strategy = Some(ExpiryStrategy::Progressive);
        self.initial_expiry_ms = Some(initial_expiry_ms);
        self.backoff_factor = Some(backoff_factor);
        self.max_expiry_ms = Some(max_expiry_ms);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> BreakerResult<()> {
        validate_tunables(
            self.max_attempts,
            self.backoff_factor,
            self.initial_expiry_ms,
            self.max_expiry_ms,
        )
    }
}

/// Options accepted by `configure`.
///
/// For a single connection only the tunables apply. For the global
/// configuration `initial_expiry_ms` and `max_expiry_ms` are ignored, since
/// they are derived per connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigureOptions {
    /// `Some(None)` disables count-based opening.
    pub max_attempts: Option<Option<u32>>,
    pub expiry_ms: Option<u64>,
    pub expiry_strategy: Option<ExpiryStrategy>,
    pub initial_expiry_ms: Option<u64>,
    pub max_expiry_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub cleanup_interval_ms: Option<u64>,
    pub inactive_threshold_ms: Option<u64>,
}

impl ConfigureOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(Some(attempts));
        self
    }

    pub fn unlimited_attempts(mut self) -> Self {
        self.max_attempts = Some(None);
        self
    }

    pub fn expiry_ms(mut self, expiry_ms: u64) -> Self {
        self.expiry_ms = Some(expiry_ms);
        self
    }

    pub fn expiry_strategy(mut self, strategy: ExpiryStrategy) -> Self {
        self.expiry_strategy = Some(strategy);
        self
    }

    pub fn initial_expiry_ms(mut self, initial_expiry_ms: u64) -> Self {
        self.initial_expiry_ms = Some(initial_expiry_ms);
        self
    }

    pub fn max_expiry_ms(mut self, max_expiry_ms: u64) -> Self {
        self.max_expiry_ms = Some(max_expiry_ms);
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = Some(factor);
        self
    }

    pub fn cleanup_interval_ms(mut self, interval_ms: u64) -> Self {
        self.cleanup_interval_ms = Some(interval_ms);
        self
    }

    pub fn inactive_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.inactive_threshold_ms = Some(threshold_ms);
        self
    }

    pub fn validate(&self) -> BreakerResult<()> {
        if self.cleanup_interval_ms == Some(0) {
            return Err(BreakerError::InvalidOptions(
                "cleanup_interval_ms must be greater than 0".to_string(),
            ));
        }
        validate_tunables(
            self.max_attempts,
            self.backoff_factor,
            self.initial_expiry_ms,
            self.max_expiry_ms,
        )
    }

    /// Merge these options into a global configuration.
    pub fn apply_to(&self, config: &mut GlobalConfig) {
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(expiry) = self.expiry_ms {
            config.expiry_ms = expiry;
        }
        if let Some(strategy) = self.expiry_strategy {
            config.expiry_strategy = strategy;
        }
        if let Some(factor) = self.backoff_factor {
            config.backoff_factor = factor;
        }
        if let Some(interval) = self.cleanup_interval_ms {
            config.cleanup_interval_ms = interval;
        }
        if let Some(threshold) = self.inactive_threshold_ms {
            config.inactive_threshold_ms = threshold;
        }
    }
}

impl From<&GlobalConfig> for ConfigureOptions {
    fn from(config: &GlobalConfig) -> Self {
        Self {
            max_attempts: Some(config.max_attempts),
            expiry_ms: Some(config.expiry_ms),
            expiry_strategy: Some(config.expiry_strategy),
            initial_expiry_ms: None,
            max_expiry_ms: None,
            backoff_factor: Some(config.backoff_factor),
            cleanup_interval_ms: Some(config.cleanup_interval_ms),
            inactive_threshold_ms: Some(config.inactive_threshold_ms),
        }
    }
}

fn validate_tunables(
    max_attempts: Option<Option<u32>>,
    backoff_factor: Option<f64>,
    initial_expiry_ms: Option<u64>,
    max_expiry_ms: Option<u64>,
) -> BreakerResult<()> {
    if max_attempts == Some(Some(0)) {
        return Err(BreakerError::InvalidOptions(
            "max_attempts must be greater than 0".to_string(),
        ));
    }
    if let Some(factor) = backoff_factor {
        if !factor.is_finite() || factor < 1.0 {
            return Err(BreakerError::InvalidOptions(format!(
                "backoff_factor must be a finite number >= 1.0, got {}",
                factor
            )));
        }
    }
    if let (Some(initial), Some(max)) = (initial_expiry_ms, max_expiry_ms) {
        if max < initial {
            return Err(BreakerError::InvalidOptions(format!(
                "max_expiry_ms ({}) is below initial_expiry_ms ({})",
                max, initial
            )));
        }
    }
    Ok(())
}
