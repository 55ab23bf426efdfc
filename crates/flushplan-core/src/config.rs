//! Save-engine configuration.
//!
//! Every section and field has a default, so an empty document is a valid
//! configuration. Unknown keys are rejected.

use crate::{batch::BatchLimits, retry::RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("invalid save config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

///
/// SaveConfig
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SaveConfig {
    pub batch: BatchConfig,
    pub executor: ExecutorConfig,
    pub retry: RetryConfig,
}

impl SaveConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.batch.validate()?;
        self.retry.validate()
    }
}

///
/// BatchConfig
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub max_commands: usize,
    pub max_parameters: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_commands: BatchLimits::DEFAULT_MAX_COMMANDS,
            max_parameters: BatchLimits::DEFAULT_MAX_PARAMETERS,
        }
    }
}

impl BatchConfig {
    #[must_use]
    pub const fn limits(&self) -> BatchLimits {
        BatchLimits {
            max_commands: self.max_commands,
            max_parameters: self.max_parameters,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_commands == 0 {
            return Err(ConfigError::invalid("batch.max_commands", "must be at least 1"));
        }
        if self.max_parameters == 0 {
            return Err(ConfigError::invalid("batch.max_parameters", "must be at least 1"));
        }

        Ok(())
    }
}

///
/// ExecutorConfig
///

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Start and commit a transaction when the caller has none.
    pub auto_transactions: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            auto_transactions: true,
        }
    }
}

///
/// RetryConfig
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_retry_count: usize,
    pub max_retry_delay_ms: u64,
    pub coefficient_ms: u64,
    pub exponential_base: f64,
    pub random_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();

        Self {
            enabled: true,
            max_retry_count: policy.max_retry_count,
            max_retry_delay_ms: duration_ms(policy.max_retry_delay),
            coefficient_ms: duration_ms(policy.coefficient),
            exponential_base: policy.exponential_base,
            random_factor: policy.random_factor,
        }
    }
}

impl RetryConfig {
    /// The configured policy, or `None` when retries are disabled.
    #[must_use]
    pub const fn policy(&self) -> Option<RetryPolicy> {
        if !self.enabled {
            return None;
        }

        Some(RetryPolicy {
            max_retry_count: self.max_retry_count,
            max_retry_delay: Duration::from_millis(self.max_retry_delay_ms),
            coefficient: Duration::from_millis(self.coefficient_ms),
            exponential_base: self.exponential_base,
            random_factor: self.random_factor,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.exponential_base.is_finite() || self.exponential_base <= 1.0 {
            return Err(ConfigError::invalid(
                "retry.exponential_base",
                format!("must be greater than 1, got {}", self.exponential_base),
            ));
        }
        if !self.random_factor.is_finite() || self.random_factor < 1.0 {
            return Err(ConfigError::invalid(
                "retry.random_factor",
                format!("must be at least 1, got {}", self.random_factor),
            ));
        }

        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

///
/// TESTS
///
