//! Exponential backoff used between retry attempts.
//!
//! Attempt semantics: `delay(k)` is the pause scheduled after the `k`-th failed attempt
//! (1-indexed), i.e. `min(base * multiplier^(k-1), max)`. `delay(0)` is zero because the
//! first call never waits.
//!
//! ```rust
//! use std::time::Duration;
//! use bulwark::Backoff;
//!
//! let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 2.0);
//! assert_eq!(backoff.delay(0), Duration::ZERO);
//! assert_eq!(backoff.delay(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay(2), Duration::from_millis(200));
//! assert_eq!(backoff.delay(5), Duration::from_secs(1)); // capped
//! ```
//!
//! Delays are whole milliseconds. Products that overflow or are not finite saturate to the
//! cap.

use crate::config::RetryConfig;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    /// Callers are expected to pass validated values (`max >= base`, finite `multiplier > 0`);
    /// [`RetryConfig`] guarantees this.
    pub fn new(base: Duration, max: Duration, multiplier: f64) -> Self {
        Self { base, max, multiplier }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.base_delay(), config.max_delay(), config.backoff_multiplier())
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Delay after the `attempt`-th failure.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let max_millis = self.max.as_millis() as f64;
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let raw = self.base.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = if raw.is_finite() { raw.min(max_millis) } else { max_millis };
        Duration::from_millis(capped.max(0.0).round() as u64)
    }
}
