//! Circuit breaker: fail fast after sustained failure.
//!
//! State machine:
//! - **Closed** (initial): calls run; `failure_threshold` consecutive failures open the circuit.
//! - **Open**: calls fail with [`PolicyError::CircuitOpen`] without running the operation
//!   until the clock reaches `next_attempt_millis`.
//! - **HalfOpen**: entered lazily by the first call observed at or after
//!   `next_attempt_millis`; that call is itself the first trial call. `success_threshold`
//!   consecutive successes close the circuit, any failure reopens it.
//!
//! There is no background timer. All counters and the state live behind one mutex so a
//! transition and its counter updates are observed together; the lock is never held
//! across an await.
//!
//! ```rust
//! use bulwark::{CircuitBreaker, CircuitBreakerConfig, CircuitState, PolicyError};
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::new(1, 1, Duration::from_secs(30)).unwrap());
//! let _ = breaker
//!     .execute(|| async { Err::<(), _>(PolicyError::Inner(std::io::Error::other("down"))) })
//!     .await;
//! assert_eq!(breaker.state(), CircuitState::Open);
//! # });
//! ```

use crate::clock::{Clock, MonotonicClock};
use crate::config::CircuitBreakerConfig;
use crate::error::PolicyError;
use crate::policy::{ErasedOperation, ErasedResult, Policy, PolicyKind};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Short-circuits calls until the cool-down elapses.
    Open,
    /// Probing whether the dependency recovered.
    HalfOpen,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Set while `state` is `Open`.
    pub next_attempt_millis: Option<u64>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    next_attempt_millis: u64,
    last_failure_millis: Option<u64>,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            next_attempt_millis: 0,
            last_failure_millis: None,
        }
    }
}

/// Circuit breaker guarding async operations.
///
/// Clones share the same state, so every handle observes and drives the same lifecycle.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    state: Arc<Mutex<BreakerState>>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            name: Arc::from("circuit-breaker"),
            config,
            state: Arc::new(Mutex::new(BreakerState::closed())),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Arc::from(name.into());
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Stored state. An expired OPEN circuit still reports `Open` until the next call.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Current CLOSED failure streak. A streak older than `reset_timeout` reads as zero.
    pub fn failure_count(&self) -> u32 {
        let now = self.clock.now_millis();
        self.live_failures(&self.lock(), now)
    }

    pub fn success_count(&self) -> u32 {
        self.lock().success_count
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = self.clock.now_millis();
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            failure_count: self.live_failures(&inner, now),
            success_count: inner.success_count,
            next_attempt_millis: (inner.state == CircuitState::Open)
                .then_some(inner.next_attempt_millis),
        }
    }

    /// Whether a call made now would reach the operation.
    pub fn is_available(&self) -> bool {
        let now = self.clock.now_millis();
        let inner = self.lock();
        inner.state != CircuitState::Open || now >= inner.next_attempt_millis
    }

    /// Force CLOSED with all counters zeroed.
    pub fn reset(&self) {
        *self.lock() = BreakerState::closed();
        tracing::info!(breaker = %self.name, "Circuit breaker reset → closed");
    }

    /// Run `operation` under breaker protection.
    ///
    /// # Errors
    /// - [`PolicyError::CircuitOpen`] while open, without running the operation.
    /// - Whatever the operation returned otherwise; every error counts as a failure.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, PolicyError<E>>
    where
        Fut: Future<Output = Result<T, PolicyError<E>>>,
        Op: FnOnce() -> Fut,
    {
        self.admit()?;

        let result = operation().await;
        match &result {
            Ok(_) => self.on_success(),
            Err(_) => self.on_failure(),
        }
        result
    }

    fn admit<E>(&self) -> Result<(), PolicyError<E>> {
        let now = self.clock.now_millis();
        let mut inner = self.lock();
        if inner.state == CircuitState::Open {
            if now < inner.next_attempt_millis {
                tracing::debug!(
                    breaker = %self.name,
                    next_attempt_millis = inner.next_attempt_millis,
                    "Circuit breaker: open, rejecting call"
                );
                return Err(PolicyError::CircuitOpen {
                    next_attempt_millis: inner.next_attempt_millis,
                });
            }
            inner.state = CircuitState::HalfOpen;
            inner.success_count = 0;
            tracing::info!(breaker = %self.name, "Circuit breaker → half-open");
        }
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        inner.failure_count = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.success_count = inner.success_count.saturating_add(1);
            if inner.success_count >= self.config.success_threshold() {
                inner.state = CircuitState::Closed;
                inner.success_count = 0;
                inner.last_failure_millis = None;
                tracing::info!(breaker = %self.name, "Circuit breaker → closed");
            }
        }
    }

    fn on_failure(&self) {
        let now = self.clock.now_millis();
        let mut inner = self.lock();

        inner.failure_count = self.live_failures(&inner, now).saturating_add(1);
        inner.last_failure_millis = Some(now);
        let failures = inner.failure_count;

        match inner.state {
            CircuitState::HalfOpen => {
                self.trip(&mut inner, now);
                tracing::warn!(breaker = %self.name, failures, "Circuit breaker: trial call failed → open");
            }
            CircuitState::Closed if failures >= self.config.failure_threshold() => {
                self.trip(&mut inner, now);
                tracing::error!(
                    breaker = %self.name,
                    failures,
                    threshold = self.config.failure_threshold(),
                    "Circuit breaker → open"
                );
            }
            _ => {}
        }
    }

    fn live_failures(&self, inner: &BreakerState, now: u64) -> u32 {
        if inner.state == CircuitState::Closed {
            if let (Some(reset), Some(last)) =
                (self.config.reset_timeout(), inner.last_failure_millis)
            {
                if now.saturating_sub(last) >= millis(reset) {
                    return 0;
                }
            }
        }
        inner.failure_count
    }

    fn trip(&self, inner: &mut BreakerState, now: u64) {
        inner.state = CircuitState::Open;
        inner.success_count = 0;
        inner.next_attempt_millis = now.saturating_add(millis(self.config.timeout()));
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl<E> Policy<E> for CircuitBreaker
where
    E: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::CircuitBreaker
    }

    fn execute_erased<'a>(
        &'a self,
        operation: ErasedOperation<'a, E>,
    ) -> BoxFuture<'a, ErasedResult<E>> {
        Box::pin(self.execute(move || operation()))
    }
}
