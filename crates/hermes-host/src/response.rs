//! Synthetic outbound response.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use hermes_core::HandlerError;

/// Callback fired exactly once when a response is finalized.
pub type CompletionCallback = Box<dyn FnOnce(&SyntheticResponse) + Send>;

/// Errors raised by response operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResponseError {
    /// The response has already been closed.
    #[error("response is closed")]
    Closed,
}

impl From<ResponseError> for HandlerError {
    fn from(err: ResponseError) -> Self {
        Self::failed(err)
    }
}

/// An in-memory stand-in for an outbound response.
///
/// Clones share the same state. The completion callback runs on the first
/// [`close`](Self::close) (or [`end`](Self::end)) and is finished before
/// [`is_closed`](Self::is_closed) reports `true`.
///
/// # Example
///
/// ```
/// use hermes_host::SyntheticResponse;
/// use tokio_util::sync::CancellationToken;
///
/// let response = SyntheticResponse::new(CancellationToken::new(), false, |_| {});
/// response.write("hello").unwrap();
/// response.close();
///
/// assert_eq!(response.read_as_string(), "hello");
/// assert!(response.write("again").is_err());
/// ```
#[derive(Clone)]
pub struct SyntheticResponse {
    inner: Arc<ResponseInner>,
}

struct ResponseInner {
    cancel: CancellationToken,
    disable_writes: bool,
    state: Mutex<ResponseState>,
    /// Won by the first close call
    closing: AtomicBool,
    /// Set once the completion callback has returned
    closed: AtomicBool,
    on_complete: Mutex<Option<CompletionCallback>>,
}

struct ResponseState {
    status: StatusCode,
    content_type: Option<String>,
    body: BytesMut,
    bytes_written: usize,
}

impl SyntheticResponse {
    /// Creates a response bound to `cancel`.
    ///
    /// With `disable_writes`, written bytes are counted but not buffered.
    pub fn new<F>(cancel: CancellationToken, disable_writes: bool, on_complete: F) -> Self
    where
        F: FnOnce(&Self) + Send + 'static,
    {
        Self {
            inner: Arc::new(ResponseInner {
                cancel,
                disable_writes,
                state: Mutex::new(ResponseState {
                    status: StatusCode::OK,
                    content_type: None,
                    body: BytesMut::new(),
                    bytes_written: 0,
                }),
                closing: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                on_complete: Mutex::new(Some(Box::new(on_complete))),
            }),
        }
    }

    /// Returns the status code (200 unless changed).
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.inner.state.lock().status
    }

    /// Sets the status code.
    pub fn set_status_code(&self, status: StatusCode) {
        self.inner.state.lock().status = status;
    }

    /// Returns the content type, if one was set.
    #[must_use]
    pub fn content_type(&self) -> Option<String> {
        self.inner.state.lock().content_type.clone()
    }

    /// Sets the content type.
    pub fn set_content_type(&self, content_type: impl Into<String>) {
        self.inner.state.lock().content_type = Some(content_type.into());
    }

    /// Appends `data` to the body.
    ///
    /// When writes are disabled the data is counted and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError::Closed`] once closing has started.
    pub fn write(&self, data: impl AsRef<[u8]>) -> Result<(), ResponseError> {
        if self.inner.closing.load(Ordering::Acquire) {
            return Err(ResponseError::Closed);
        }

        let data = data.as_ref();
        let mut state = self.inner.state.lock();
        state.bytes_written += data.len();
        if !self.inner.disable_writes {
            state.body.extend_from_slice(data);
        }
        Ok(())
    }

    /// Flushes buffered output. Nothing to do in memory beyond the closed check.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError::Closed`] once closing has started.
    pub fn flush(&self) -> Result<(), ResponseError> {
        if self.inner.closing.load(Ordering::Acquire) {
            return Err(ResponseError::Closed);
        }
        Ok(())
    }

    /// Finishes the response from inside a handler. Same as [`close`](Self::close).
    pub fn end(&self) -> bool {
        self.close()
    }

    /// Closes the response, firing the completion callback.
    ///
    /// Returns `true` for the call that performed the close; every later
    /// call is a no-op returning `false`.
    pub fn close(&self) -> bool {
        if self.inner.closing.swap(true, Ordering::AcqRel) {
            return false;
        }

        let callback = self.inner.on_complete.lock().take();
        if let Some(callback) = callback {
            callback(self);
        }

        self.inner.closed.store(true, Ordering::Release);
        true
    }

    /// Returns `true` once the response is closed and its callback has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns `true` if written data is discarded.
    #[must_use]
    pub fn writes_disabled(&self) -> bool {
        self.inner.disable_writes
    }

    /// Returns the total number of bytes passed to [`write`](Self::write).
    #[must_use]
    pub fn bytes_written(&self) -> usize {
        self.inner.state.lock().bytes_written
    }

    /// Returns a copy of the buffered body.
    #[must_use]
    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.inner.state.lock().body)
    }

    /// Returns the buffered body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn read_as_string(&self) -> String {
        String::from_utf8_lossy(&self.inner.state.lock().body).into_owned()
    }

    /// Returns the cancellation token shared with the request.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }
}

impl fmt::Debug for SyntheticResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SyntheticResponse")
            .field("status", &state.status)
            .field("content_type", &state.content_type)
            .field("bytes_written", &state.bytes_written)
            .field("writes_disabled", &self.inner.disable_writes)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
