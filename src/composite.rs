//! Ordered nesting of policies around one operation.
//!
//! Attachment order is nesting order: the first policy attached is the outermost layer.
//! Attaching a circuit breaker, then a retry executor, then a bulkhead yields
//! `breaker(retry(bulkhead(op)))`, so the breaker only sees the outcome after retries and
//! every retry attempt passes through bulkhead admission.
//!
//! ```rust
//! use bulwark::{Bulkhead, BulkheadConfig, CircuitBreaker, CircuitBreakerConfig};
//! use bulwark::{CompositePolicy, PolicyError, RetryConfig, RetryExecutor};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut policy: CompositePolicy<std::io::Error> = CompositePolicy::new();
//! policy
//!     .attach_circuit_breaker(CircuitBreaker::new(CircuitBreakerConfig::default()))
//!     .attach_retry(RetryExecutor::new(RetryConfig::default()))
//!     .attach_bulkhead(Bulkhead::new(BulkheadConfig::default()));
//!
//! let value = policy.execute(|| async { Ok::<_, PolicyError<std::io::Error>>(7) }).await;
//! assert_eq!(value.unwrap(), 7);
//! # });
//! ```

use crate::bulkhead::Bulkhead;
use crate::circuit_breaker::CircuitBreaker;
use crate::error::PolicyError;
use crate::policy::{erase, unerase, ErasedOperation, ErasedResult, Policy, PolicyKind};
use crate::retry::RetryExecutor;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A named, ordered chain of policies that is itself a [`Policy`].
///
/// Mutation takes `&mut self`, so the chain cannot change while an `execute` borrowing it
/// is in flight.
pub struct CompositePolicy<E> {
    name: Arc<str>,
    policies: Vec<Arc<dyn Policy<E>>>,
}

impl<E> Clone for CompositePolicy<E> {
    fn clone(&self) -> Self {
        Self { name: Arc::clone(&self.name), policies: self.policies.clone() }
    }
}

impl<E> fmt::Debug for CompositePolicy<E>
where
    E: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositePolicy")
            .field("name", &self.name)
            .field("policies", &self.policies.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl<E> Default for CompositePolicy<E>
where
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> CompositePolicy<E>
where
    E: Send + 'static,
{
    pub fn new() -> Self {
        Self { name: Arc::from("composite"), policies: Vec::new() }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Arc::from(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attach_circuit_breaker(&mut self, breaker: CircuitBreaker) -> &mut Self {
        self.attach_policy(breaker)
    }

    pub fn attach_retry(&mut self, retry: RetryExecutor<E>) -> &mut Self {
        self.attach_policy(retry)
    }

    pub fn attach_bulkhead(&mut self, bulkhead: Bulkhead) -> &mut Self {
        self.attach_policy(bulkhead)
    }

    /// Append any policy as the new innermost layer.
    pub fn attach_policy<P>(&mut self, policy: P) -> &mut Self
    where
        P: Policy<E> + 'static,
    {
        self.policies.push(Arc::new(policy));
        self
    }

    /// Remove the first policy named `name`, returning it.
    pub fn detach(&mut self, name: &str) -> Option<Arc<dyn Policy<E>>> {
        let index = self.policies.iter().position(|p| p.name() == name)?;
        Some(self.policies.remove(index))
    }

    pub fn clear(&mut self) {
        self.policies.clear();
    }

    /// Attached policies, outermost first.
    pub fn policies(&self) -> &[Arc<dyn Policy<E>>] {
        &self.policies
    }

    /// First attached policy named `name`.
    pub fn policy(&self, name: &str) -> Option<&Arc<dyn Policy<E>>> {
        self.policies.iter().find(|p| p.name() == name)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Run `operation` through every attached policy. With nothing attached the operation
    /// runs exactly once, unguarded.
    ///
    /// `operation` may be invoked several times when a retry executor is in the chain.
    ///
    /// # Panics
    ///
    /// Panics if an attached custom policy replaces the operation's value; see [`Policy`].
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, PolicyError<E>>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, PolicyError<E>>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        unerase(self.run_chain(erase(operation)).await)
    }

    fn run_chain<'a>(&'a self, operation: ErasedOperation<'a, E>) -> BoxFuture<'a, ErasedResult<E>> {
        tracing::trace!(composite = %self.name, layers = self.policies.len(), "Composite: executing chain");

        let mut chained = operation;
        for policy in self.policies.iter().rev() {
            let next = chained;
            chained = Arc::new(move || -> BoxFuture<'a, ErasedResult<E>> {
                policy.execute_erased(Arc::clone(&next))
            });
        }
        chained()
    }
}

impl<E> Policy<E> for CompositePolicy<E>
where
    E: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Composite
    }

    fn execute_erased<'a>(
        &'a self,
        operation: ErasedOperation<'a, E>,
    ) -> BoxFuture<'a, ErasedResult<E>> {
        self.run_chain(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::config::{BulkheadConfig, CircuitBreakerConfig, RetryConfig};
    use crate::sleeper::RecordingSleeper;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    impl crate::classify::ErrorKind for TestError {
        fn kind(&self) -> &str {
            "TestError"
        }
    }

    /// Records entry and exit around the rest of the chain.
    #[derive(Debug)]
    struct Tracer {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Policy<TestError> for Tracer {
        fn name(&self) -> &str {
            self.name
        }

        fn execute_erased<'a>(
            &'a self,
            operation: ErasedOperation<'a, TestError>,
        ) -> BoxFuture<'a, ErasedResult<TestError>> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("{} enter", self.name));
                let result = operation().await;
                self.log.lock().unwrap().push(format!("{} exit", self.name));
                result
            })
        }
    }

    fn retry(max_attempts: u32) -> RetryExecutor<TestError> {
        let config = RetryConfig::builder()
            .max_attempts(max_attempts)
            .base_delay(Duration::from_millis(10))
            .jitter(false)
            .build()
            .unwrap();
        RetryExecutor::new(config).with_sleeper(RecordingSleeper::new())
    }

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig::new(threshold, 1, Duration::from_secs(60)).unwrap())
    }

    fn flaky(
        calls: &AtomicUsize,
        failures: usize,
    ) -> impl FnMut() -> futures::future::Ready<Result<usize, PolicyError<TestError>>> + Send + '_ {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            futures::future::ready(if n <= failures {
                Err(PolicyError::Inner(TestError(format!("failure {}", n))))
            } else {
                Ok(n)
            })
        }
    }

    #[tokio::test]
    async fn empty_chain_runs_operation_once() {
        let policy: CompositePolicy<TestError> = CompositePolicy::new();
        let calls = AtomicUsize::new(0);
        assert_eq!(policy.execute(flaky(&calls, 0)).await.unwrap(), 1);

        let failing = AtomicUsize::new(0);
        let result = policy.execute(flaky(&failing, 5)).await;
        assert_eq!(result, Err(PolicyError::Inner(TestError("failure 1".into()))));
        assert_eq!(failing.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_attached_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut policy: CompositePolicy<TestError> = CompositePolicy::new();
        policy
            .attach_policy(Tracer { name: "outer", log: log.clone() })
            .attach_policy(Tracer { name: "inner", log: log.clone() });

        let op_log = log.clone();
        let value = policy
            .execute(move || {
                op_log.lock().unwrap().push("op".to_string());
                async { Ok::<_, PolicyError<TestError>>("done") }
            })
            .await;

        assert_eq!(value.unwrap(), "done");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer enter", "inner enter", "op", "inner exit", "outer exit"]
        );
    }

    #[tokio::test]
    async fn retry_inside_breaker_hides_transient_failures() {
        let circuit = breaker(1);
        let mut policy = CompositePolicy::new();
        policy.attach_circuit_breaker(circuit.clone()).attach_retry(retry(3));

        let calls = AtomicUsize::new(0);
        let value = policy.execute(flaky(&calls, 2)).await;

        assert_eq!(value.unwrap(), 3);
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.failure_count(), 0);
    }

    #[tokio::test]
    async fn breaker_sees_one_failure_per_exhausted_retry() {
        let circuit = breaker(2);
        let mut policy = CompositePolicy::new();
        policy.attach_circuit_breaker(circuit.clone()).attach_retry(retry(3));

        let calls = AtomicUsize::new(0);
        let result = policy.execute(flaky(&calls, usize::MAX)).await;

        assert_eq!(result, Err(PolicyError::Inner(TestError("failure 3".into()))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(circuit.failure_count(), 1);
        assert_eq!(circuit.state(), CircuitState::Closed);

        let _ = policy.execute(flaky(&calls, usize::MAX)).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let before = calls.load(Ordering::SeqCst);
        let rejected = policy.execute(flaky(&calls, usize::MAX)).await;
        assert!(rejected.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn each_retry_attempt_passes_the_bulkhead() {
        let bulkhead = Bulkhead::new(BulkheadConfig::new(1, 1, Duration::from_secs(1)).unwrap());
        let mut policy = CompositePolicy::new();
        policy.attach_retry(retry(4)).attach_bulkhead(bulkhead.clone());

        let calls = AtomicUsize::new(0);
        assert_eq!(policy.execute(flaky(&calls, 3)).await.unwrap(), 4);
        assert_eq!(bulkhead.stats().available_permits, 1);
    }

    #[tokio::test]
    async fn lookup_detach_and_clear() {
        let mut policy: CompositePolicy<TestError> = CompositePolicy::new();
        policy
            .attach_circuit_breaker(breaker(3).with_name("payments-breaker"))
            .attach_retry(retry(2))
            .attach_bulkhead(Bulkhead::new(BulkheadConfig::default()));

        let names: Vec<_> = policy.policies().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["payments-breaker", "retry", "bulkhead"]);
        assert_eq!(policy.policy("retry").map(|p| p.kind()), Some(PolicyKind::Retry));
        assert!(policy.policy("missing").is_none());

        let removed = policy.detach("retry").unwrap();
        assert_eq!(removed.kind(), PolicyKind::Retry);
        assert_eq!(policy.len(), 2);
        assert!(policy.detach("retry").is_none());

        policy.clear();
        assert!(policy.is_empty());
    }

    #[tokio::test]
    async fn composites_nest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut inner: CompositePolicy<TestError> = CompositePolicy::new().with_name("inner-chain");
        inner.attach_policy(Tracer { name: "b", log: log.clone() });

        let mut outer: CompositePolicy<TestError> = CompositePolicy::new();
        outer.attach_policy(Tracer { name: "a", log: log.clone() }).attach_policy(inner);

        let value = outer.execute(|| async { Ok::<_, PolicyError<TestError>>(1u8) }).await;
        assert_eq!(value.unwrap(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["a enter", "b enter", "b exit", "a exit"]);
        assert_eq!(outer.policy("inner-chain").unwrap().kind(), PolicyKind::Composite);
    }
}
