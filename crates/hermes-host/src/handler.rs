//! Connection handlers and the path registry.
//!
//! A [`ConnectionHandler`] is the unit of logic a dispatch runs. Handlers are
//! registered against a path in a [`HandlerRegistry`]; the registry is
//! read-only once it is handed to a host.
//!
//! # Example
//!
//! ```rust
//! use hermes_host::handler::HandlerRegistry;
//! use hermes_host::HostContext;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_fn("/echo", |ctx: HostContext| async move {
//!     let msg = ctx.request().form_value("msg").unwrap_or_default().to_string();
//!     ctx.response().write(msg)?;
//!     Ok(())
//! });
//!
//! assert!(registry.resolve("/echo").is_some());
//! assert!(registry.resolve("/echo/send").is_some());
//! assert!(registry.resolve("/other").is_none());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use hermes_core::{HandlerResult, Resolver};

use crate::context::HostContext;

/// Type alias for a boxed handler future.
pub type BoxedHandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A routed unit of request logic.
///
/// `process` owns its [`HostContext`]; the response can be finished early with
/// `end()`, otherwise the host closes it once the future completes.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Called once per dispatch, before [`process`](Self::process).
    fn initialize(&self, _resolver: &Resolver, _ctx: &HostContext) {}

    /// Runs the handler for one dispatch.
    fn process(&self, ctx: HostContext) -> BoxedHandlerFuture;
}

/// Adapts an async closure into a [`ConnectionHandler`].
pub struct FnHandler<F> {
    func: F,
}

impl<F, Fut> ConnectionHandler for FnHandler<F>
where
    F: Fn(HostContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn process(&self, ctx: HostContext) -> BoxedHandlerFuture {
        Box::pin((self.func)(ctx))
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Wraps an async closure as a handler.
pub fn handler_fn<F, Fut>(func: F) -> FnHandler<F>
where
    F: Fn(HostContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler { func }
}

/// Maps local paths to handlers.
///
/// Lookups are ASCII case-insensitive and ignore a trailing slash. A handler
/// registered at `/chat` also serves `/chat/negotiate`; the longest registered
/// prefix on a segment boundary wins.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ConnectionHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any handler at the same path.
    pub fn register<H: ConnectionHandler>(&mut self, path: &str, handler: H) {
        self.handlers.insert(normalize(path), Arc::new(handler));
    }

    /// Registers an async closure as a handler.
    pub fn register_fn<F, Fut>(&mut self, path: &str, func: F)
    where
        F: Fn(HostContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(path, handler_fn(func));
    }

    /// Finds the handler serving `local_path`.
    #[must_use]
    pub fn resolve(&self, local_path: &str) -> Option<Arc<dyn ConnectionHandler>> {
        let mut path = normalize(local_path);
        loop {
            if let Some(handler) = self.handlers.get(&path) {
                return Some(Arc::clone(handler));
            }
            match path.rfind('/') {
                Some(0) if path.len() > 1 => path.truncate(1),
                Some(idx) if idx > 0 => path.truncate(idx),
                _ => return None,
            }
        }
    }

    /// Returns `true` if a handler serves `local_path`.
    #[must_use]
    pub fn contains(&self, local_path: &str) -> bool {
        self.resolve(local_path).is_some()
    }

    /// Returns the number of registered paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Returns the registered paths in sorted order.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("paths", &self.paths())
            .finish()
    }
}

fn normalize(path: &str) -> String {
    let mut path = path.trim().to_ascii_lowercase();
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    path
}
