//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::config::schema::GlobalConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const MAX_ATTEMPTS_ENV_VAR: &str = "BREAKER_MAX_ATTEMPTS";
pub const EXPIRY_ENV_VAR: &str = "BREAKER_EXPIRY_MS";
pub const CLEANUP_INTERVAL_ENV_VAR: &str = "BREAKER_CLEANUP_INTERVAL_MS";
pub const INACTIVE_THRESHOLD_ENV_VAR: &str = "BREAKER_INACTIVE_THRESHOLD_MS";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, value } => {
                write!(f, "Invalid value {:?} for environment variable {}", value, var)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GlobalConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: GlobalConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build the effective configuration: defaults, then the optional file,
/// then `BREAKER_*` environment variables.
pub fn load_config_with_env(path: Option<&Path>) -> Result<GlobalConfig, ConfigError> {
    load_config_with_lookup(path, |var| std::env::var(var).ok())
}

/// Same as [`load_config_with_env`], reading variables through `lookup`.
pub fn load_config_with_lookup<F>(path: Option<&Path>, lookup: F) -> Result<GlobalConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => GlobalConfig::default(),
    };

    apply_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply overrides from a variable lookup (the process environment in production).
pub fn apply_overrides<F>(config: &mut GlobalConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(max_attempts) = parse_var::<u32, _>(&lookup, MAX_ATTEMPTS_ENV_VAR)? {
        config.max_attempts = Some(max_attempts);
    }
    if let Some(expiry) = parse_var(&lookup, EXPIRY_ENV_VAR)? {
        config.expiry_ms = expiry;
    }
    if let Some(interval) = parse_var(&lookup, CLEANUP_INTERVAL_ENV_VAR)? {
        config.cleanup_interval_ms = interval;
    }
    if let Some(threshold) = parse_var(&lookup, INACTIVE_THRESHOLD_ENV_VAR)? {
        config.inactive_threshold_ms = threshold;
    }
    Ok(())
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
        None => Ok(None),
    }
}
