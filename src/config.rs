use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{ConsistencyLevel, DriverError, Result};

/// Budgets for the retry policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Endpoint failovers allowed per operation.
    pub max_failover_retry_count: u32,
    /// Delay before the second and later failovers of a write.
    pub failover_write_retry_delay_ms: u64,
    /// When false, regional failover and session retries are disabled.
    pub enable_endpoint_discovery: bool,
    pub max_throttle_retry_attempts: u32,
    /// Ceiling on the summed throttling delays of one operation.
    pub max_throttle_wait_ms: u64,
    pub throttle_backoff_factor: u32,
    /// Used when a throttled response carries no retry-after header.
    pub default_throttle_retry_after_ms: u64,
    /// Immediate retries on partition-gone in bulk operations.
    pub max_partition_gone_retries: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_failover_retry_count: 120,
            failover_write_retry_delay_ms: 1_000,
            enable_endpoint_discovery: true,
            max_throttle_retry_attempts: 9,
            max_throttle_wait_ms: 30_000,
            throttle_backoff_factor: 1,
            default_throttle_retry_after_ms: 5_000,
            max_partition_gone_retries: 5,
        }
    }
}

impl RetryOptions {
    pub fn max_failover_retry_count(mut self, count: u32) -> Self {
        self.max_failover_retry_count = count;
        self
    }

    pub fn enable_endpoint_discovery(mut self, enabled: bool) -> Self {
        self.enable_endpoint_discovery = enabled;
        self
    }

    pub fn max_throttle_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_throttle_retry_attempts = attempts;
        self
    }

    pub fn max_throttle_wait(mut self, wait: Duration) -> Self {
        self.max_throttle_wait_ms = wait.as_millis() as u64;
        self
    }

    pub fn throttle_backoff_factor(mut self, factor: u32) -> Self {
        self.throttle_backoff_factor = factor;
        self
    }

    pub fn default_throttle_retry_after(mut self, delay: Duration) -> Self {
        self.default_throttle_retry_after_ms = delay.as_millis() as u64;
        self
    }

    pub fn max_partition_gone_retries(mut self, retries: u32) -> Self {
        self.max_partition_gone_retries = retries;
        self
    }

    pub fn failover_write_retry_delay(&self) -> Duration {
        Duration::from_millis(self.failover_write_retry_delay_ms)
    }

    pub fn max_throttle_wait_duration(&self) -> Duration {
        Duration::from_millis(self.max_throttle_wait_ms)
    }

    pub fn default_throttle_retry_after_duration(&self) -> Duration {
        Duration::from_millis(self.default_throttle_retry_after_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.throttle_backoff_factor == 0 {
            return Err(DriverError::Configuration(
                "throttle_backoff_factor must be at least 1".to_string(),
            ));
        }
        if self.max_throttle_wait_ms == 0 && self.max_throttle_retry_attempts > 0 {
            return Err(DriverError::Configuration(
                "max_throttle_wait_ms must be positive when throttle retries are enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Driver-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Consistency assumed for requests that do not set their own.
    pub default_consistency: ConsistencyLevel,
    pub session_store_shards: usize,
    pub retry: RetryOptions,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            default_consistency: ConsistencyLevel::Session,
            session_store_shards: 16,
            retry: RetryOptions::default(),
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_consistency(mut self, level: ConsistencyLevel) -> Self {
        self.default_consistency = level;
        self
    }

    pub fn session_store_shards(mut self, shards: usize) -> Self {
        self.session_store_shards = shards;
        self
    }

    pub fn retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| DriverError::Configuration(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_store_shards == 0 {
            return Err(DriverError::Configuration(
                "session_store_shards must be at least 1".to_string(),
            ));
        }
        self.retry.validate()
    }
}
