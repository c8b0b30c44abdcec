//! Configuration for the resilience manager.

use std::time::Duration;

use thiserror::Error;

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Result type for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tunable constants for [`ResilienceManager`].
///
/// [`ResilienceManager`]: super::ResilienceManager
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Maximum attempts made by the synchronous recovery loop.
    pub max_retries: u32,
    /// Fixed sleep between recovery attempts.
    pub retry_interval: Duration,
    /// Capacity of the bounded operation queue.
    pub queue_capacity: usize,
    /// Maximum time an admitted operation waits in the queue.
    pub queue_timeout: Duration,
    /// Consecutive failures that trip the circuit breaker.
    pub circuit_breaker_threshold: u32,
    /// Cooldown window after the breaker trips.
    pub circuit_breaker_reset: Duration,
    /// Period of the background metrics snapshot.
    pub metrics_interval: Duration,
    /// How long `close()` waits for each background worker to stop.
    pub close_join_timeout: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_interval: Duration::from_millis(1500),
            queue_capacity: 1000,
            queue_timeout: Duration::from_secs(5),
            circuit_breaker_threshold: 10,
            circuit_breaker_reset: Duration::from_secs(60),
            metrics_interval: Duration::from_secs(300),
            close_join_timeout: Duration::from_secs(5),
        }
    }
}

impl ResilienceConfig {
    /// Create a configuration builder.
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid {
                message: "max_retries must be greater than 0".to_string(),
            });
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                message: "queue_capacity must be greater than 0".to_string(),
            });
        }

        if self.circuit_breaker_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "circuit_breaker_threshold must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for [`ResilienceConfig`].
#[derive(Debug, Default)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self { config: ResilienceConfig::default() }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval = interval;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.config.queue_timeout = timeout;
        self
    }

    pub fn circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.config.circuit_breaker_threshold = threshold;
        self
    }

    pub fn circuit_breaker_reset(mut self, reset: Duration) -> Self {
        self.config.circuit_breaker_reset = reset;
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.config.metrics_interval = interval;
        self
    }

    pub fn close_join_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_join_timeout = timeout;
        self
    }

    pub fn build(self) -> ConfigResult<ResilienceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
