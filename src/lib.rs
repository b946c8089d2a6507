#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Bulwark
//!
//! Fault-tolerance policies for async Rust: circuit breakers, retries with exponential
//! backoff and jitter, fair bulkheads, and composite chains that nest them around one call.
//!
//! ## Features
//!
//! - **Circuit breaker** with lazy half-open probing and an injectable clock
//! - **Retry executor** with capped exponential backoff, jitter and swappable error classifiers
//! - **Bulkhead** with a FIFO wait queue, load shedding and a queue timeout
//! - **Composite policy** where attachment order is nesting order
//! - **Tower layer** turning any policy into middleware
//!
//! ## Quick Start
//!
//! ```rust
//! use bulwark::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RetryConfig::builder()
//!         .max_attempts(3)
//!         .base_delay(Duration::from_millis(50))
//!         .build()
//!         .unwrap();
//!
//!     let mut policy: CompositePolicy<std::io::Error> = CompositePolicy::new();
//!     policy
//!         .attach_circuit_breaker(CircuitBreaker::new(CircuitBreakerConfig::default()))
//!         .attach_retry(RetryExecutor::new(config))
//!         .attach_bulkhead(Bulkhead::new(BulkheadConfig::default()));
//!
//!     let result = policy
//!         .execute(|| async {
//!             // Your async operation here
//!             Ok::<_, PolicyError<std::io::Error>>(())
//!         })
//!         .await;
//!     assert!(result.is_ok());
//! }
//! ```

pub mod backoff;
pub mod bulkhead;
pub mod circuit_breaker;
pub mod classify;
pub mod clock;
pub mod composite;
pub mod config;
pub mod error;
pub mod jitter;
pub mod layer;
pub mod policy;
pub mod prelude;
pub mod retry;
pub mod sleeper;

// Re-exports
pub use backoff::Backoff;
pub use bulkhead::{Bulkhead, BulkheadStats};
pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use classify::{ErrorClassifier, ErrorKind};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use composite::CompositePolicy;
pub use config::{BulkheadConfig, CircuitBreakerConfig, RetryConfig, RetryConfigBuilder};
pub use error::{ConfigError, PolicyError};
pub use jitter::Jitter;
pub use layer::{PolicyLayer, PolicyService};
pub use policy::{Policy, PolicyKind};
pub use retry::RetryExecutor;
pub use sleeper::{InstantSleeper, RecordingSleeper, Sleeper, TokioSleeper};
