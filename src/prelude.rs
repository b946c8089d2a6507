//! Convenient re-exports for common Bulwark types.
pub use crate::{
    backoff::Backoff,
    bulkhead::{Bulkhead, BulkheadStats},
    circuit_breaker::{CircuitBreaker, CircuitState},
    classify::{ErrorClassifier, ErrorKind},
    composite::CompositePolicy,
    config::{BulkheadConfig, CircuitBreakerConfig, RetryConfig},
    error::{ConfigError, PolicyError},
    jitter::Jitter,
    layer::PolicyLayer,
    policy::Policy,
    retry::RetryExecutor,
};
