//! Error types for Hermes.
//!
//! Two error types flow through a dispatch:
//!
//! - [`HandlerError`] is what a handler returns. It either marks the run as
//!   cancelled or carries the handler's own error object.
//! - [`HostError`] is what the caller of `dispatch` observes. Every failure
//!   path, including a handler fault, ends up as exactly one of its variants.

use thiserror::Error;

/// A boxed, thread-safe error object.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias using [`HostError`].
pub type HostResult<T> = Result<T, HostError>;

/// Result type returned by connection handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Terminal failure of a handler run.
///
/// # Example
///
/// ```
/// use hermes_core::HandlerError;
///
/// let err = HandlerError::failed("boom");
/// assert!(!err.is_cancelled());
/// assert!(HandlerError::Cancelled.is_cancelled());
/// ```
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The handler observed a cancellation and stopped early.
    #[error("handler was cancelled")]
    Cancelled,

    /// The handler failed with its own error.
    #[error("{0}")]
    Failed(#[source] BoxError),
}

impl HandlerError {
    /// Wraps an arbitrary error as a handler failure.
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Self::Failed(error.into())
    }

    /// Returns `true` if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(err.into())
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        Self::Failed(Box::new(err))
    }
}

/// Errors surfaced by the in-memory host.
///
/// The dispatch kinds are ordered the way they are checked: shutdown first,
/// then endpoint resolution, then request preparation, then the handler's
/// own outcome.
#[derive(Error, Debug)]
pub enum HostError {
    /// The host has been disposed and no longer accepts requests.
    #[error("host is shut down and not accepting requests")]
    HostShutDown,

    /// No handler is registered for the requested path.
    #[error("not a valid end point: {path}")]
    EndpointNotFound {
        /// The local path (or raw URL when it could not be parsed).
        path: String,
    },

    /// The caller-supplied preparation step failed.
    #[error("request preparation failed: {0}")]
    PreparationFailed(#[source] BoxError),

    /// The handler failed; the error is forwarded unchanged.
    #[error("handler faulted: {0}")]
    HandlerFaulted(#[source] BoxError),

    /// The handler run was cancelled.
    #[error("handler was cancelled")]
    HandlerCancelled,

    /// One or more release hooks failed during teardown.
    #[error("failed to release host resources ({} hook(s) failed)", .failures.len())]
    ReleaseFailed {
        /// The errors returned by the failing hooks, in execution order.
        failures: Vec<BoxError>,
    },
}

impl HostError {
    /// Creates an endpoint-not-found error.
    pub fn endpoint_not_found(path: impl Into<String>) -> Self {
        Self::EndpointNotFound { path: path.into() }
    }

    /// Creates a preparation failure from any error.
    pub fn preparation(error: impl Into<BoxError>) -> Self {
        Self::PreparationFailed(error.into())
    }

    /// Returns `true` if the dispatch was rejected because the host is shut down.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, Self::HostShutDown)
    }

    /// Returns `true` if the dispatch resolved as cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::HandlerCancelled)
    }

    /// Returns `true` if no handler matched the path.
    #[must_use]
    pub const fn is_endpoint_not_found(&self) -> bool {
        matches!(self, Self::EndpointNotFound { .. })
    }

    /// Returns the handler's own error if this is a fault.
    #[must_use]
    pub fn handler_fault(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::HandlerFaulted(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<HandlerError> for HostError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Cancelled => Self::HandlerCancelled,
            HandlerError::Failed(source) => Self::HandlerFaulted(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("database unavailable")]
    struct DatabaseDown;

    #[test]
    fn test_handler_error_failed_keeps_source() {
        let err = HandlerError::failed(DatabaseDown);
        assert_eq!(err.to_string(), "database unavailable");
        match err {
            HandlerError::Failed(inner) => assert!(inner.downcast_ref::<DatabaseDown>().is_some()),
            HandlerError::Cancelled => panic!("expected failure"),
        }
    }

    #[test]
    fn test_handler_error_from_anyhow() {
        let err: HandlerError = anyhow::anyhow!("bad frame").into();
        assert!(!err.is_cancelled());
        assert_eq!(err.to_string(), "bad frame");
    }

    #[test]
    fn test_cancelled_maps_to_host_cancelled() {
        let err: HostError = HandlerError::Cancelled.into();
        assert!(err.is_cancelled());
        assert!(err.handler_fault().is_none());
    }

    #[test]
    fn test_failed_maps_to_fault_verbatim() {
        let err: HostError = HandlerError::failed(DatabaseDown).into();
        let fault = err.handler_fault().expect("fault");
        assert!(fault.downcast_ref::<DatabaseDown>().is_some());
        assert_eq!(err.to_string(), "handler faulted: database unavailable");
    }

    #[test]
    fn test_endpoint_not_found_display() {
        let err = HostError::endpoint_not_found("/missing");
        assert!(err.is_endpoint_not_found());
        assert_eq!(err.to_string(), "not a valid end point: /missing");
    }

    #[test]
    fn test_release_failed_display() {
        let err = HostError::ReleaseFailed {
            failures: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            err.to_string(),
            "failed to release host resources (2 hook(s) failed)"
        );
    }

    #[test]
    fn test_preparation_source() {
        use std::error::Error as _;
        let err = HostError::preparation(DatabaseDown);
        assert!(err.source().is_some());
        assert!(!err.is_shutdown());
    }
}
