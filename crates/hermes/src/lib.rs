//! # Hermes
//!
//! An in-memory request host. Hermes runs routed connection handlers exactly
//! as a transport would (one response per request, cancellable mid-flight,
//! completed exactly once) but without sockets, listeners or a network stack.
//!
//! ## Quick Start
//!
//! ```rust
//! use hermes::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let host = MemoryHost::builder()
//!     .route_fn("/echo", |ctx: HostContext| async move {
//!         let msg = ctx.request().form_value("msg").unwrap_or_default().to_string();
//!         ctx.response().write(msg)?;
//!         Ok(())
//!     })
//!     .build();
//!
//! let body = FormData::from([("msg".to_string(), "hi".to_string())]);
//! let response = host.post("/echo", |_| Ok(()), body).await.unwrap();
//! assert_eq!(response.read_as_string(), "hi");
//!
//! host.dispose().unwrap();
//! assert!(host.get("/echo", |_| Ok(())).await.unwrap_err().is_shutdown());
//! # }
//! ```
//!
//! ## Crates
//!
//! ```text
//! hermes-core       identity, errors, shutdown signal, resolver
//! hermes-host       synthetic request/response, registry, MemoryHost
//! hermes-config     HermesConfig + layered ConfigLoader
//! hermes-telemetry  tracing-subscriber setup
//! ```

#![doc(html_root_url = "https://docs.rs/hermes/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use hermes_core as core;

// Re-export the host
pub use hermes_host as host;

// Re-export configuration
pub use hermes_config as config;

// Re-export telemetry
pub use hermes_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// ```rust
/// use hermes::prelude::*;
/// ```
pub mod prelude {
    pub use hermes_core::{
        CallerIdentity, HandlerError, HandlerResult, HostError, HostResult, Items, RequestId,
        Resolver, ShutdownSignal,
    };

    pub use hermes_host::{
        BoxedHandlerFuture, CancelReason, ConnectionHandler, DispatchFuture, FormData,
        HandlerRegistry, HostContext, MemoryHost, SyntheticRequest, SyntheticResponse,
    };

    pub use hermes_config::{ConfigLoader, HermesConfig};

    pub use hermes_telemetry::{init_logging, LogConfig};
}
