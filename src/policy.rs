//! The `Policy` capability shared by every guard.
//!
//! Each concrete policy has a strongly typed inherent `execute`. To let policies of
//! different kinds sit in one ordered chain, they also implement the object-safe
//! [`Policy`] trait, which works on a type-erased operation: a shareable closure
//! returning a boxed future whose success value is `Box<dyn Any + Send>`. The composite
//! and the tower layer erase the caller's value on the way in and recover it on the
//! way out; policies only thread the value through, they never inspect it.

use crate::error::PolicyError;
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

/// Success value of an erased operation.
pub type Erased = Box<dyn Any + Send>;

/// Result of an erased operation.
pub type ErasedResult<E> = Result<Erased, PolicyError<E>>;

/// Shareable, re-invocable, type-erased operation.
pub type ErasedOperation<'a, E> = Arc<dyn Fn() -> BoxFuture<'a, ErasedResult<E>> + Send + Sync + 'a>;

/// Which built-in guard a policy is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    CircuitBreaker,
    Retry,
    Bulkhead,
    Composite,
    Custom,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyKind::CircuitBreaker => "circuit-breaker",
            PolicyKind::Retry => "retry",
            PolicyKind::Bulkhead => "bulkhead",
            PolicyKind::Composite => "composite",
            PolicyKind::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// A guard that can wrap any operation failing with `PolicyError<E>`.
///
/// Implementations must resolve to exactly the value produced by `operation` (or an
/// error); replacing the erased value is a contract violation.
///
/// # Panics
///
/// A policy that resolves to a value of another type makes [`unerase`] panic, and with
/// it [`CompositePolicy::execute`](crate::CompositePolicy::execute) and every
/// [`PolicyService`](crate::PolicyService) call routed through that policy.
pub trait Policy<E>: Send + Sync + fmt::Debug
where
    E: Send + 'static,
{
    /// Name used for lookup and diagnostics.
    fn name(&self) -> &str;

    fn kind(&self) -> PolicyKind {
        PolicyKind::Custom
    }

    /// Run `operation` under this policy.
    fn execute_erased<'a>(&'a self, operation: ErasedOperation<'a, E>)
        -> BoxFuture<'a, ErasedResult<E>>;
}

impl<E, P> Policy<E> for Arc<P>
where
    E: Send + 'static,
    P: Policy<E> + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn kind(&self) -> PolicyKind {
        (**self).kind()
    }

    fn execute_erased<'a>(
        &'a self,
        operation: ErasedOperation<'a, E>,
    ) -> BoxFuture<'a, ErasedResult<E>> {
        (**self).execute_erased(operation)
    }
}

/// Erase a typed operation. `FnMut` operations are serialized through a mutex that is
/// only held while the future is created, never across an await.
pub fn erase<'a, T, E, Fut, Op>(operation: Op) -> ErasedOperation<'a, E>
where
    T: Send + 'static,
    E: Send + 'static,
    Fut: Future<Output = Result<T, PolicyError<E>>> + Send + 'a,
    Op: FnMut() -> Fut + Send + 'a,
{
    let operation = Mutex::new(operation);
    Arc::new(move || -> BoxFuture<'a, ErasedResult<E>> {
        let fut = {
            let mut op = operation.lock().unwrap_or_else(PoisonError::into_inner);
            op()
        };
        Box::pin(async move { fut.await.map(|value| Box::new(value) as Erased) })
    })
}

/// Recover the typed value an erased chain resolved to.
///
/// # Panics
///
/// Panics if the chain resolved to something other than a `T`, which only happens when a
/// custom [`Policy`] replaced the operation's value.
pub fn unerase<T: 'static, E>(result: ErasedResult<E>) -> Result<T, PolicyError<E>> {
    let erased = result?;
    match erased.downcast::<T>() {
        Ok(value) => Ok(*value),
        Err(_) => panic!("a policy replaced the operation's value with a foreign type"),
    }
}
