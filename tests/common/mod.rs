#![allow(dead_code)]

use bulwark::{ErrorKind, PolicyError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Install a test-writer subscriber once per test binary. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TestError {
    #[error("connection reset by peer")]
    ConnectionReset,
    #[error("service unavailable ({0})")]
    Unavailable(u16),
    #[error("invalid request: {0}")]
    Validation(String),
}

impl ErrorKind for TestError {
    fn kind(&self) -> &str {
        match self {
            TestError::ConnectionReset => "ConnectionReset",
            TestError::Unavailable(_) => "Unavailable",
            TestError::Validation(_) => "Validation",
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            TestError::Unavailable(status) => Some(*status),
            _ => None,
        }
    }
}

/// Operation failing with `error` for the first `failures` calls, then returning the
/// 1-based call number.
#[derive(Clone)]
pub struct Flaky {
    calls: Arc<AtomicUsize>,
    failures: usize,
    error: TestError,
}

impl Flaky {
    pub fn new(failures: usize, error: TestError) -> Self {
        Self { calls: Arc::new(AtomicUsize::new(0)), failures, error }
    }

    pub fn always(error: TestError) -> Self {
        Self::new(usize::MAX, error)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn call(&self) -> Result<usize, PolicyError<TestError>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            Err(PolicyError::Inner(self.error.clone()))
        } else {
            Ok(n)
        }
    }
}
