//! # Hermes Host
//!
//! Runs routed connection handlers in memory, without sockets or listeners.
//!
//! A [`MemoryHost`] owns a [`HandlerRegistry`], a [`Resolver`](hermes_core::Resolver)
//! and a [`ShutdownSignal`](hermes_core::ShutdownSignal). Each call to
//! [`MemoryHost::dispatch`] builds a [`SyntheticRequest`] / [`SyntheticResponse`]
//! pair, runs the matching [`ConnectionHandler`] on the Tokio runtime and
//! returns a [`DispatchFuture`] that resolves exactly once.
//!
//! ## Outcomes
//!
//! | Situation | Result |
//! |---|---|
//! | host disposed | `HostError::HostShutDown` |
//! | no handler for the path | `HostError::EndpointNotFound` |
//! | `prepare` failed | `HostError::PreparationFailed` |
//! | handler returned `Ok` or called `end()` | the response |
//! | handler returned `HandlerError::Failed` or panicked | `HostError::HandlerFaulted` |
//! | handler returned `HandlerError::Cancelled` | `HostError::HandlerCancelled` |
//!
//! ## Example
//!
//! ```rust
//! use hermes_host::{HostContext, MemoryHost};
//! use hermes_core::HandlerError;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let host = MemoryHost::builder()
//!     .route_fn("/slow", |ctx: HostContext| async move {
//!         ctx.cancelled().await;
//!         Err(HandlerError::Cancelled)
//!     })
//!     .build();
//!
//! let pending = host.get("/slow", |_| Ok(()));
//! pending.abort();
//! assert!(pending.await.unwrap_err().is_cancelled());
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-host/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod completion;
mod context;
pub mod handler;
mod host;
mod request;
mod response;

pub use completion::CompletionCell;
pub use context::{CancelReason, HostContext};
pub use handler::{handler_fn, BoxedHandlerFuture, ConnectionHandler, FnHandler, HandlerRegistry};
pub use host::{DispatchFuture, DispatchResult, HandlerPanicked, MemoryHost, MemoryHostBuilder};
pub use request::{FormData, RequestError, SyntheticRequest};
pub use response::{CompletionCallback, ResponseError, SyntheticResponse};
