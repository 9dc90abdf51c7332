//! Service resolver handed to connection handlers.
//!
//! A [`Resolver`] stores `Arc`-wrapped services keyed by type. Services are
//! registered before the host is built and resolved by handlers while they
//! initialise. When the host is disposed the resolver is released: every
//! registered release hook runs once, in reverse registration order, and the
//! stored services are dropped.
//!
//! # Example
//!
//! ```rust
//! use hermes_core::Resolver;
//! use std::sync::Arc;
//!
//! struct Clock;
//!
//! let mut resolver = Resolver::new();
//! resolver.register(Arc::new(Clock));
//! resolver.on_release("close-clock", || Ok(()));
//!
//! assert!(resolver.resolve::<Clock>().is_some());
//! resolver.release().unwrap();
//! assert!(resolver.resolve::<Clock>().is_none());
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{BoxError, HostError};

/// A release hook run once at teardown.
pub type ReleaseHook = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// A type-keyed service container with teardown hooks.
#[derive(Default)]
pub struct Resolver {
    services: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    release_hooks: Mutex<Vec<(String, ReleaseHook)>>,
    released: AtomicBool,
}

impl Resolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service, replacing any earlier service of the same type.
    pub fn register<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.services.get_mut().insert(TypeId::of::<T>(), service);
    }

    /// Registers a named hook to run when the resolver is released.
    pub fn on_release<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.release_hooks
            .get_mut()
            .push((name.into(), Box::new(hook)));
    }

    /// Resolves a service by type.
    ///
    /// Returns `None` if the service is not registered or the resolver has
    /// been released.
    #[must_use]
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|s| Arc::clone(s).downcast::<T>().ok())
    }

    /// Returns `true` if a service of type `T` is registered.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.services.read().contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// Returns `true` if no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }

    /// Returns `true` once [`release`](Self::release) has run.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Runs all release hooks and drops every service.
    ///
    /// Only the first call does any work. Every hook runs even if an earlier
    /// one fails; the failures are returned together.
    pub fn release(&self) -> Result<(), HostError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let hooks = std::mem::take(&mut *self.release_hooks.lock());
        let mut failures = Vec::new();
        for (name, hook) in hooks.into_iter().rev() {
            if let Err(err) = hook() {
                tracing::error!(hook = %name, error = %err, "Release hook failed");
                failures.push(err);
            }
        }

        self.services.write().clear();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HostError::ReleaseFailed { failures })
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("service_count", &self.services.read().len())
            .field("release_hooks", &self.release_hooks.lock().len())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Database {
        url: String,
    }

    #[test]
    fn test_register_and_resolve() {
        let mut resolver = Resolver::new();
        resolver.register(Arc::new(Database {
            url: "postgres://localhost".to_string(),
        }));

        let db = resolver.resolve::<Database>().expect("registered");
        assert_eq!(db.url, "postgres://localhost");
        assert!(resolver.contains::<Database>());
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn test_resolve_missing() {
        let resolver = Resolver::new();
        assert!(resolver.resolve::<Database>().is_none());
        assert!(resolver.is_empty());
    }

    #[test]
    fn test_hooks_run_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut resolver = Resolver::new();
        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            resolver.on_release(name, move || {
                order.lock().push(name);
                Ok(())
            });
        }

        resolver.release().expect("release should succeed");
        assert_eq!(*order.lock(), vec!["third", "second", "first"]);
    }

    #[test]
    fn test_release_runs_once() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut resolver = Resolver::new();
        let counter = Arc::clone(&calls);
        resolver.on_release("count", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        resolver.release().unwrap();
        resolver.release().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(resolver.is_released());
    }

    #[test]
    fn test_failing_hook_does_not_stop_others() {
        let ran = Arc::new(AtomicBool::new(false));
        let mut resolver = Resolver::new();
        let flag = Arc::clone(&ran);
        resolver.on_release("ok", move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        resolver.on_release("broken", || Err("socket already closed".into()));
        resolver.register(Arc::new(Database {
            url: String::new(),
        }));

        let err = resolver.release().expect_err("release should report failure");
        match err {
            HostError::ReleaseFailed { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].to_string(), "socket already closed");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(ran.load(Ordering::SeqCst));
        assert!(resolver.is_empty());
    }
}
