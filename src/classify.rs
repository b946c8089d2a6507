//! Error classification for retry decisions.
//!
//! An [`ErrorClassifier`] is a pure predicate over an operation error: `true` means the
//! failure is transient and worth another attempt. Classifiers are built from small
//! factories and combined with [`ErrorClassifier::or`], [`ErrorClassifier::and`] and
//! [`ErrorClassifier::negate`].
//!
//! ```rust
//! use bulwark::ErrorClassifier;
//!
//! let transient: ErrorClassifier<std::io::Error> = ErrorClassifier::network()
//!     .or(ErrorClassifier::messages(["try again"]));
//! let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer went away");
//! assert!(transient.matches(&err));
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

/// Error kinds treated as network failures by [`ErrorClassifier::network`].
pub const NETWORK_KINDS: &[&str] = &[
    "ConnectionRefused",
    "ConnectionReset",
    "ConnectionAborted",
    "NotConnected",
    "BrokenPipe",
    "TimedOut",
    "NetworkError",
    "TimeoutError",
    "ECONNRESET",
    "ECONNREFUSED",
    "ECONNABORTED",
    "ETIMEDOUT",
    "EPIPE",
    "ENOTFOUND",
    "EAI_AGAIN",
];

/// Message fragments (matched case-insensitively) treated as network failures.
pub const NETWORK_MESSAGES: &[&str] = &[
    "network",
    "connection reset",
    "connection refused",
    "connection aborted",
    "broken pipe",
    "timed out",
    "timeout",
    "socket hang up",
    "econnreset",
    "econnrefused",
    "etimedout",
];

/// Declared identity of an error, used for kind- and status-based classification.
pub trait ErrorKind {
    /// Stable identifier of the failure kind, e.g. `"ConnectionReset"`.
    fn kind(&self) -> &str;

    /// HTTP-like status code, when the failure came from a response.
    fn status(&self) -> Option<u16> {
        None
    }
}

impl ErrorKind for io::Error {
    fn kind(&self) -> &str {
        match io::Error::kind(self) {
            io::ErrorKind::ConnectionRefused => "ConnectionRefused",
            io::ErrorKind::ConnectionReset => "ConnectionReset",
            io::ErrorKind::ConnectionAborted => "ConnectionAborted",
            io::ErrorKind::NotConnected => "NotConnected",
            io::ErrorKind::BrokenPipe => "BrokenPipe",
            io::ErrorKind::TimedOut => "TimedOut",
            io::ErrorKind::Interrupted => "Interrupted",
            io::ErrorKind::WouldBlock => "WouldBlock",
            io::ErrorKind::UnexpectedEof => "UnexpectedEof",
            io::ErrorKind::NotFound => "NotFound",
            io::ErrorKind::PermissionDenied => "PermissionDenied",
            io::ErrorKind::InvalidInput => "InvalidInput",
            io::ErrorKind::InvalidData => "InvalidData",
            _ => "Other",
        }
    }
}

/// Predicate deciding whether an operation error is retryable.
pub struct ErrorClassifier<E> {
    predicate: Arc<dyn Fn(&E) -> bool + Send + Sync>,
}

impl<E> Clone for ErrorClassifier<E> {
    fn clone(&self) -> Self {
        Self { predicate: Arc::clone(&self.predicate) }
    }
}

impl<E> fmt::Debug for ErrorClassifier<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorClassifier").field("predicate", &"<predicate>").finish()
    }
}

impl<E: 'static> ErrorClassifier<E> {
    /// Wrap an arbitrary predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self { predicate: Arc::new(predicate) }
    }

    /// Every error is retryable.
    pub fn always() -> Self {
        Self::new(|_| true)
    }

    /// No error is retryable.
    pub fn never() -> Self {
        Self::new(|_| false)
    }

    /// Retry errors whose [`ErrorKind::kind`] is one of `kinds`.
    pub fn kinds<I, S>(kinds: I) -> Self
    where
        E: ErrorKind,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kinds: Vec<String> = kinds.into_iter().map(Into::into).collect();
        Self::new(move |e: &E| kinds.iter().any(|k| k == e.kind()))
    }

    /// Retry errors whose message contains any of `patterns`, ignoring case.
    pub fn messages<I, S>(patterns: I) -> Self
    where
        E: fmt::Display,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> =
            patterns.into_iter().map(|p| p.into().to_lowercase()).collect();
        Self::new(move |e: &E| {
            let message = e.to_string().to_lowercase();
            patterns.iter().any(|p| message.contains(p.as_str()))
        })
    }

    /// Heuristic for transport failures: a network kind from [`NETWORK_KINDS`] or a
    /// message containing one of [`NETWORK_MESSAGES`].
    pub fn network() -> Self
    where
        E: ErrorKind + fmt::Display,
    {
        let by_message = Self::messages(NETWORK_MESSAGES.iter().copied());
        Self::new(move |e: &E| {
            NETWORK_KINDS.iter().any(|k| *k == e.kind()) || by_message.matches(e)
        })
    }

    /// Retry responses carrying a 5xx status.
    pub fn server_errors() -> Self
    where
        E: ErrorKind,
    {
        Self::new(|e: &E| matches!(e.status(), Some(500..=599)))
    }

    /// Retryable if either classifier says so.
    pub fn or(self, other: Self) -> Self {
        Self::new(move |e: &E| self.matches(e) || other.matches(e))
    }

    /// Retryable only if both classifiers say so.
    pub fn and(self, other: Self) -> Self {
        Self::new(move |e: &E| self.matches(e) && other.matches(e))
    }

    /// Invert the decision.
    pub fn negate(self) -> Self {
        Self::new(move |e: &E| !self.matches(e))
    }
}

impl<E> ErrorClassifier<E> {
    /// Evaluate the predicate.
    pub fn matches(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}
