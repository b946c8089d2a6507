//! Tower integration: wrap any service in a [`Policy`].
//!
//! Each attempt the policy makes drives a fresh clone of the inner service with a clone of
//! the request (`ServiceExt::oneshot`), so retries and bulkhead admission apply per call to
//! the underlying service. Service errors are converted into `E` and surface as
//! [`PolicyError::Inner`].
//!
//! ```rust
//! use bulwark::{CircuitBreaker, CircuitBreakerConfig, PolicyError, PolicyLayer};
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let layer: PolicyLayer<std::io::Error> =
//!     PolicyLayer::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
//! let service = layer.layer(service_fn(|name: &'static str| async move {
//!     Ok::<_, std::io::Error>(format!("hello {name}"))
//! }));
//! assert_eq!(service.oneshot("world").await.unwrap(), "hello world");
//! # });
//! ```

use crate::error::PolicyError;
use crate::policy::{erase, unerase, Policy};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

/// Tower layer applying a policy to every request.
pub struct PolicyLayer<E> {
    policy: Arc<dyn Policy<E>>,
}

impl<E> PolicyLayer<E>
where
    E: Send + 'static,
{
    pub fn new<P>(policy: P) -> Self
    where
        P: Policy<E> + 'static,
    {
        Self { policy: Arc::new(policy) }
    }

    /// Share a policy already held elsewhere.
    pub fn from_arc(policy: Arc<dyn Policy<E>>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &Arc<dyn Policy<E>> {
        &self.policy
    }
}

impl<E> Clone for PolicyLayer<E> {
    fn clone(&self) -> Self {
        Self { policy: Arc::clone(&self.policy) }
    }
}

impl<E> fmt::Debug for PolicyLayer<E>
where
    E: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyLayer").field("policy", &self.policy).finish()
    }
}

impl<S, E> Layer<S> for PolicyLayer<E> {
    type Service = PolicyService<S, E>;

    fn layer(&self, inner: S) -> Self::Service {
        PolicyService { inner, policy: Arc::clone(&self.policy) }
    }
}

/// Service produced by [`PolicyLayer`].
pub struct PolicyService<S, E> {
    inner: S,
    policy: Arc<dyn Policy<E>>,
}

impl<S: Clone, E> Clone for PolicyService<S, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), policy: Arc::clone(&self.policy) }
    }
}

impl<S: fmt::Debug, E> fmt::Debug for PolicyService<S, E>
where
    E: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyService")
            .field("inner", &self.inner)
            .field("policy", &self.policy.name())
            .finish()
    }
}

impl<S, E, Request> Service<Request> for PolicyService<S, E>
where
    Request: Clone + Send + 'static,
    S: Service<Request> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Into<E>,
    S::Future: Send + 'static,
    E: Send + 'static,
{
    type Response = S::Response;
    type Error = PolicyError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness is awaited per attempt by `oneshot`.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let policy = Arc::clone(&self.policy);
        let inner = self.inner.clone();
        Box::pin(async move {
            let operation = erase(move || {
                let service = inner.clone();
                let request = request.clone();
                async move { service.oneshot(request).await.map_err(|e| PolicyError::Inner(e.into())) }
            });
            unerase(policy.execute_erased(operation).await)
        })
    }
}
