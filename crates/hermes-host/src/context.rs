//! Per-dispatch context handed to connection handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use hermes_core::{keys, Items, RequestId};

use crate::request::SyntheticRequest;
use crate::response::SyntheticResponse;

/// Why a handler was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The request itself was aborted.
    Request,
    /// The host is shutting down.
    Shutdown,
}

/// Everything a handler sees for one dispatch.
///
/// The request is read-only once the handler runs. The [`Items`] map always
/// carries the host's shutdown token under [`keys::SHUTDOWN_TOKEN`].
#[derive(Debug, Clone)]
pub struct HostContext {
    request: Arc<SyntheticRequest>,
    response: SyntheticResponse,
    items: Items,
}

impl HostContext {
    pub(crate) fn new(request: SyntheticRequest, response: SyntheticResponse, items: Items) -> Self {
        Self {
            request: Arc::new(request),
            response,
            items,
        }
    }

    /// Returns the request.
    #[must_use]
    pub fn request(&self) -> &SyntheticRequest {
        &self.request
    }

    /// Returns the response.
    #[must_use]
    pub const fn response(&self) -> &SyntheticResponse {
        &self.response
    }

    /// Returns the per-request side-channel.
    #[must_use]
    pub const fn items(&self) -> &Items {
        &self.items
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request.request_id()
    }

    /// Returns the per-request cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        self.response.cancellation_token()
    }

    /// Returns the host's shutdown token.
    #[must_use]
    pub fn shutdown_token(&self) -> Option<CancellationToken> {
        self.items
            .get::<CancellationToken>(keys::SHUTDOWN_TOKEN)
            .map(|token| token.as_ref().clone())
    }

    /// Returns `true` if either the request or the host has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token().is_cancelled()
            || self
                .shutdown_token()
                .is_some_and(|token| token.is_cancelled())
    }

    /// Waits until the request is aborted or the host shuts down.
    ///
    /// A request abort wins when both have already happened.
    pub async fn cancelled(&self) -> CancelReason {
        let request = self.cancellation_token().clone();
        match self.shutdown_token() {
            Some(shutdown) => {
                tokio::select! {
                    biased;
                    () = request.cancelled() => CancelReason::Request,
                    () = shutdown.cancelled() => CancelReason::Shutdown,
                }
            }
            None => {
                request.cancelled().await;
                CancelReason::Request
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::parse_target;
    use hermes_core::CallerIdentity;
    use std::time::Duration;

    fn context(shutdown: Option<CancellationToken>) -> HostContext {
        let abort = CancellationToken::new();
        let request = SyntheticRequest::new(
            parse_target("/ctx").unwrap(),
            abort.clone(),
            None,
            CallerIdentity::anonymous(),
        );
        let response = SyntheticResponse::new(abort, false, |_| {});
        let items = Items::new();
        if let Some(token) = shutdown {
            items.insert(keys::SHUTDOWN_TOKEN, token);
        }
        HostContext::new(request, response, items)
    }

    #[test]
    fn test_accessors() {
        let ctx = context(None);
        assert_eq!(ctx.request().local_path(), "/ctx");
        assert_eq!(ctx.request_id(), ctx.request().request_id());
        assert!(ctx.shutdown_token().is_none());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_shutdown_token_from_items() {
        let shutdown = CancellationToken::new();
        let ctx = context(Some(shutdown.clone()));

        assert!(!ctx.is_cancelled());
        shutdown.cancel();
        assert!(ctx.shutdown_token().unwrap().is_cancelled());
        assert!(ctx.is_cancelled());
        assert!(!ctx.request().is_aborted());
    }

    #[tokio::test]
    async fn test_cancelled_reports_request() {
        let ctx = context(Some(CancellationToken::new()));
        ctx.request().abort();

        let reason = tokio::time::timeout(Duration::from_secs(1), ctx.cancelled())
            .await
            .unwrap();
        assert_eq!(reason, CancelReason::Request);
    }

    #[tokio::test]
    async fn test_cancelled_reports_shutdown() {
        let shutdown = CancellationToken::new();
        let ctx = context(Some(shutdown.clone()));

        let waiter = tokio::spawn(async move { ctx.cancelled().await });
        shutdown.cancel();

        let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, CancelReason::Shutdown);
    }
}
