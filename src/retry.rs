//! Retry executor with exponential backoff, jitter and error classification.
//!
//! - Attempts the operation up to `max_attempts` times.
//! - Only operation failures (`PolicyError::Inner`) are candidates for a retry, and only
//!   when the current [`ErrorClassifier`] marks them retryable. Breaker, bulkhead and
//!   timeout errors propagate on first sight.
//! - After the `k`-th failed attempt the executor sleeps `jitter(backoff.delay(k))`.
//! - On exhaustion the error from the final attempt is returned unchanged.
//!
//! ```rust
//! use bulwark::{PolicyError, RetryConfig, RetryExecutor, sleeper::InstantSleeper};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let retry: RetryExecutor<std::io::Error> =
//!     RetryExecutor::new(RetryConfig::default()).with_sleeper(InstantSleeper);
//! let calls = &AtomicUsize::new(0);
//! let value = retry
//!     .execute(move || async move {
//!         if calls.fetch_add(1, Ordering::SeqCst) < 2 {
//!             Err(PolicyError::Inner(std::io::Error::other("flaky")))
//!         } else {
//!             Ok(42)
//!         }
//!     })
//!     .await;
//! assert_eq!(value.unwrap(), 42);
//! assert_eq!(calls.load(Ordering::SeqCst), 3);
//! # });
//! ```

use crate::backoff::Backoff;
use crate::classify::{ErrorClassifier, ErrorKind};
use crate::config::RetryConfig;
use crate::error::PolicyError;
use crate::jitter::Jitter;
use crate::policy::{ErasedOperation, ErasedResult, Policy, PolicyKind};
use crate::sleeper::{Sleeper, TokioSleeper};
use arc_swap::ArcSwap;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Bounded retries around an async operation failing with `PolicyError<E>`.
///
/// Clones share the error classifier, so [`RetryExecutor::set_error_matcher`] on one handle
/// affects every clone.
pub struct RetryExecutor<E> {
    name: Arc<str>,
    config: RetryConfig,
    backoff: Backoff,
    jitter: Jitter,
    classifier: Arc<ArcSwap<ErrorClassifier<E>>>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> Clone for RetryExecutor<E> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            config: self.config.clone(),
            backoff: self.backoff.clone(),
            jitter: self.jitter,
            classifier: Arc::clone(&self.classifier),
            sleeper: Arc::clone(&self.sleeper),
        }
    }
}

impl<E> fmt::Debug for RetryExecutor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("name", &self.name)
            .field("max_attempts", &self.config.max_attempts())
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl<E> RetryExecutor<E>
where
    E: 'static,
{
    /// Classify by [`ErrorKind`]: an empty `retryable_errors` list retries every operation
    /// error, otherwise only errors whose kind is listed.
    pub fn new(config: RetryConfig) -> Self
    where
        E: ErrorKind,
    {
        let classifier = if config.retryable_errors().is_empty() {
            ErrorClassifier::always()
        } else {
            ErrorClassifier::kinds(config.retryable_errors().to_vec())
        };
        Self::with_classifier(config, classifier)
    }

    /// Use an explicit classifier; `retryable_errors` in the config is ignored.
    pub fn with_classifier(config: RetryConfig, classifier: ErrorClassifier<E>) -> Self {
        Self {
            name: Arc::from("retry"),
            backoff: Backoff::from_config(&config),
            jitter: Jitter::enabled(config.jitter()),
            config,
            classifier: Arc::new(ArcSwap::from_pointee(classifier)),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Arc::from(name.into());
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Override the jitter derived from the config's `jitter` flag.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the retryable-error predicate for all subsequent attempts.
    pub fn set_error_matcher(&self, classifier: ErrorClassifier<E>) {
        self.classifier.store(Arc::new(classifier));
    }

    /// Current classifier.
    pub fn classifier(&self) -> ErrorClassifier<E> {
        ErrorClassifier::clone(&self.classifier.load())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Execute an async operation with retry semantics.
    ///
    /// `operation` is invoked once per attempt and must build a fresh future each time.
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, PolicyError<E>>
    where
        Fut: Future<Output = Result<T, PolicyError<E>>>,
        Op: FnMut() -> Fut,
    {
        let max_attempts = self.config.max_attempts();
        let mut attempt: u32 = 1;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(PolicyError::Inner(e)) => e,
                // Breaker, bulkhead and timeout rejections are never retried.
                Err(other) => return Err(other),
            };

            let retryable = self.classifier.load().matches(&error);
            if !retryable {
                tracing::debug!(retry = %self.name, attempt, "Retry: error not retryable");
                return Err(PolicyError::Inner(error));
            }
            if attempt >= max_attempts {
                tracing::warn!(retry = %self.name, attempts = attempt, "Retry: attempts exhausted");
                return Err(PolicyError::Inner(error));
            }
            drop(error);

            let delay = self.jitter.apply(self.backoff.delay(attempt));
            tracing::debug!(
                retry = %self.name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retry: scheduling next attempt"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

impl<E> Policy<E> for RetryExecutor<E>
where
    E: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Retry
    }

    fn execute_erased<'a>(
        &'a self,
        operation: ErasedOperation<'a, E>,
    ) -> BoxFuture<'a, ErasedResult<E>> {
        Box::pin(self.execute(move || operation()))
    }
}
