//! # Hermes Core
//!
//! Core types shared by every Hermes crate:
//!
//! - [`CallerIdentity`] - Opaque caller identity passed through to handlers
//! - [`RequestId`] - UUID v7 identifier assigned to each dispatch
//! - [`Items`] - Per-request key/value side-channel
//! - [`ShutdownSignal`] - Host-wide cancellation source
//! - [`Resolver`] - Service container released at host teardown
//! - [`HostError`] / [`HandlerError`] - Dispatch and handler error kinds

#![doc(html_root_url = "https://docs.rs/hermes-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod identity;
pub mod resolver;
pub mod shutdown;

pub use context::{keys, Items, RequestId};
pub use error::{BoxError, HandlerError, HandlerResult, HostError, HostResult};
pub use identity::{CallerIdentity, ServiceIdentity, UserIdentity};
pub use resolver::Resolver;
pub use shutdown::{InFlightToken, InFlightTracker, ShutdownSignal};
