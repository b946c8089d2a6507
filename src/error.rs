//! Error types for policies and their configuration.
use std::fmt;
use std::time::Duration;

/// Outcome of a guarded call that did not produce a value.
///
/// `Inner` carries whatever the wrapped operation failed with and is always surfaced
/// unchanged. The remaining variants are raised by a policy at its admission boundary
/// and never reach the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError<E> {
    /// The circuit breaker is open; calls are refused until `next_attempt_millis`
    /// (a reading of the breaker's clock).
    CircuitOpen { next_attempt_millis: u64 },
    /// The bulkhead had no free slot and its wait queue was full.
    BulkheadRejected { queue_length: usize, max_queue_size: usize },
    /// A bounded wait expired before the call was admitted.
    Timeout { waited: Duration, limit: Duration },
    /// The wrapped operation failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for PolicyError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen { next_attempt_millis } => {
                write!(f, "circuit breaker open (next attempt at {}ms)", next_attempt_millis)
            }
            Self::BulkheadRejected { queue_length, max_queue_size } => write!(
                f,
                "bulkhead rejected call (queue {}/{} full)",
                queue_length, max_queue_size
            ),
            Self::Timeout { waited, limit } => {
                write!(f, "timed out after {:?} (limit: {:?})", waited, limit)
            }
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for PolicyError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> PolicyError<E> {
    /// Raised by a circuit breaker fast-fail.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Raised by a bulkhead whose queue was full.
    pub fn is_bulkhead_rejected(&self) -> bool {
        matches!(self, Self::BulkheadRejected { .. })
    }

    /// Raised when a bounded wait expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The operation's own failure.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Clock reading at which the breaker accepts a trial call, if this is a fast-fail.
    pub fn next_attempt_millis(&self) -> Option<u64> {
        match self {
            Self::CircuitOpen { next_attempt_millis } => Some(*next_attempt_millis),
            _ => None,
        }
    }

    /// Queue diagnostics as `(queue_length, max_queue_size)`.
    pub fn queue_details(&self) -> Option<(usize, usize)> {
        match self {
            Self::BulkheadRejected { queue_length, max_queue_size } => {
                Some((*queue_length, *max_queue_size))
            }
            _ => None,
        }
    }

    /// Wait details as `(waited, limit)`.
    pub fn timeout_details(&self) -> Option<(Duration, Duration)> {
        match self {
            Self::Timeout { waited, limit } => Some((*waited, *limit)),
            _ => None,
        }
    }

    /// Map the operation error, leaving policy errors untouched.
    pub fn map_inner<F, O>(self, f: O) -> PolicyError<F>
    where
        O: FnOnce(E) -> F,
    {
        match self {
            Self::CircuitOpen { next_attempt_millis } => {
                PolicyError::CircuitOpen { next_attempt_millis }
            }
            Self::BulkheadRejected { queue_length, max_queue_size } => {
                PolicyError::BulkheadRejected { queue_length, max_queue_size }
            }
            Self::Timeout { waited, limit } => PolicyError::Timeout { waited, limit },
            Self::Inner(e) => PolicyError::Inner(f(e)),
        }
    }
}

/// A configuration invariant was violated at construction time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("failure_threshold must be > 0 (got {0})")]
    InvalidFailureThreshold(u32),
    #[error("success_threshold must be > 0 (got {0})")]
    InvalidSuccessThreshold(u32),
    #[error("timeout must be > 0 (got {0:?})")]
    InvalidTimeout(Duration),
    #[error("reset_timeout must be > 0 when set (got {0:?})")]
    InvalidResetTimeout(Duration),
    #[error("max_attempts must be >= 1 (got {0})")]
    InvalidMaxAttempts(u32),
    #[error("backoff_multiplier must be a finite number > 0 (got {0})")]
    InvalidBackoffMultiplier(f64),
    #[error("max_delay ({max:?}) must be >= base_delay ({base:?})")]
    MaxDelayBelowBase { base: Duration, max: Duration },
    #[error("max_concurrent must be > 0 (got {0})")]
    InvalidMaxConcurrent(usize),
    #[error("max_queue_size must be > 0 (got {0})")]
    InvalidMaxQueueSize(usize),
    #[error("queue_timeout must be > 0 (got {0:?})")]
    InvalidQueueTimeout(Duration),
}
