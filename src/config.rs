//! Validated, immutable policy configuration.
//!
//! Every constructor checks its invariants eagerly and returns [`ConfigError`] instead of
//! producing a policy that misbehaves later. `Default` values are plain constants built
//! fresh on each call; no configuration is shared between policy instances.
//!
//! With the `serde` feature the configs deserialize from millisecond-based documents and
//! run the same validation:
//!
//! ```json
//! { "failure_threshold": 5, "success_threshold": 2, "timeout_ms": 60000 }
//! ```

use crate::error::ConfigError;
use std::time::Duration;

/// Circuit breaker thresholds and cool-down.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "raw::CircuitBreakerDoc"))]
pub struct CircuitBreakerConfig {
    failure_threshold: u32,
    success_threshold: u32,
    timeout: Duration,
    reset_timeout: Option<Duration>,
}

impl CircuitBreakerConfig {
    /// `failure_threshold` consecutive failures open the circuit, which stays open for
    /// `timeout`; `success_threshold` consecutive trial successes close it again.
    pub fn new(
        failure_threshold: u32,
        success_threshold: u32,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if failure_threshold == 0 {
            return Err(ConfigError::InvalidFailureThreshold(failure_threshold));
        }
        if success_threshold == 0 {
            return Err(ConfigError::InvalidSuccessThreshold(success_threshold));
        }
        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(timeout));
        }
        Ok(Self { failure_threshold, success_threshold, timeout, reset_timeout: None })
    }

    /// Forget a CLOSED failure streak once the last failure is older than `reset_timeout`.
    pub fn with_reset_timeout(mut self, reset_timeout: Duration) -> Result<Self, ConfigError> {
        if reset_timeout.is_zero() {
            return Err(ConfigError::InvalidResetTimeout(reset_timeout));
        }
        self.reset_timeout = Some(reset_timeout);
        Ok(self)
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn success_threshold(&self) -> u32 {
        self.success_threshold
    }

    /// How long the circuit stays OPEN before a trial call is allowed.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn reset_timeout(&self) -> Option<Duration> {
        self.reset_timeout
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            reset_timeout: None,
        }
    }
}

/// Retry attempt budget and backoff shape.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "raw::RetryDoc"))]
pub struct RetryConfig {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter: bool,
    retryable_errors: Vec<String>,
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// Total attempts, including the first call.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Error kinds considered retryable; empty means every operation error is.
    pub fn retryable_errors(&self) -> &[String] {
        &self.retryable_errors
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            jitter: true,
            retryable_errors: Vec::new(),
        }
    }
}

/// Builder for [`RetryConfig`]; starts from the defaults.
#[derive(Debug, Clone, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Total attempts (initial + retries). Must be >= 1.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    /// Cap applied to every computed delay. Must be >= `base_delay`.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.backoff_multiplier = multiplier;
        self
    }

    /// Perturb each delay by up to ±10%.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.jitter = enabled;
        self
    }

    pub fn retryable_errors<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.retryable_errors = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<RetryConfig, ConfigError> {
        let config = self.config;
        if config.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.max_attempts));
        }
        if !(config.backoff_multiplier.is_finite() && config.backoff_multiplier > 0.0) {
            return Err(ConfigError::InvalidBackoffMultiplier(config.backoff_multiplier));
        }
        if config.max_delay < config.base_delay {
            return Err(ConfigError::MaxDelayBelowBase {
                base: config.base_delay,
                max: config.max_delay,
            });
        }
        Ok(config)
    }
}

/// Bulkhead concurrency limit and wait-queue bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "raw::BulkheadDoc"))]
pub struct BulkheadConfig {
    max_concurrent: usize,
    max_queue_size: usize,
    queue_timeout: Duration,
}

impl BulkheadConfig {
    pub fn new(
        max_concurrent: usize,
        max_queue_size: usize,
        queue_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if max_concurrent == 0 {
            return Err(ConfigError::InvalidMaxConcurrent(max_concurrent));
        }
        if max_queue_size == 0 {
            return Err(ConfigError::InvalidMaxQueueSize(max_queue_size));
        }
        if queue_timeout.is_zero() {
            return Err(ConfigError::InvalidQueueTimeout(queue_timeout));
        }
        Ok(Self { max_concurrent, max_queue_size, queue_timeout })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Longest a queued call may wait for a slot.
    pub fn queue_timeout(&self) -> Duration {
        self.queue_timeout
    }
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self { max_concurrent: 10, max_queue_size: 100, queue_timeout: Duration::from_secs(30) }
    }
}

#[cfg(feature = "serde")]
mod raw {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    pub(super) struct CircuitBreakerDoc {
        failure_threshold: u32,
        success_threshold: u32,
        timeout_ms: u64,
        #[serde(default)]
        reset_timeout_ms: Option<u64>,
    }

    impl TryFrom<CircuitBreakerDoc> for CircuitBreakerConfig {
        type Error = ConfigError;

        fn try_from(doc: CircuitBreakerDoc) -> Result<Self, Self::Error> {
            let config = CircuitBreakerConfig::new(
                doc.failure_threshold,
                doc.success_threshold,
                Duration::from_millis(doc.timeout_ms),
            )?;
            match doc.reset_timeout_ms {
                Some(ms) => config.with_reset_timeout(Duration::from_millis(ms)),
                None => Ok(config),
            }
        }
    }

    #[derive(Deserialize)]
    pub(super) struct RetryDoc {
        max_attempts: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
        #[serde(default)]
        jitter: bool,
        #[serde(default)]
        retryable_errors: Vec<String>,
    }

    impl TryFrom<RetryDoc> for RetryConfig {
        type Error = ConfigError;

        fn try_from(doc: RetryDoc) -> Result<Self, Self::Error> {
            RetryConfig::builder()
                .max_attempts(doc.max_attempts)
                .base_delay(Duration::from_millis(doc.base_delay_ms))
                .max_delay(Duration::from_millis(doc.max_delay_ms))
                .backoff_multiplier(doc.backoff_multiplier)
                .jitter(doc.jitter)
                .retryable_errors(doc.retryable_errors)
                .build()
        }
    }

    #[derive(Deserialize)]
    pub(super) struct BulkheadDoc {
        max_concurrent: usize,
        max_queue_size: usize,
        queue_timeout_ms: u64,
    }

    impl TryFrom<BulkheadDoc> for BulkheadConfig {
        type Error = ConfigError;

        fn try_from(doc: BulkheadDoc) -> Result<Self, Self::Error> {
            BulkheadConfig::new(
                doc.max_concurrent,
                doc.max_queue_size,
                Duration::from_millis(doc.queue_timeout_ms),
            )
        }
    }
}
