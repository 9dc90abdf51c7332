//! Per-request identifiers and the key/value side-channel.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known [`Items`] keys set by the host.
pub mod keys {
    /// Key under which the host's shutdown token is stored.
    ///
    /// The value is a `tokio_util::sync::CancellationToken`.
    pub const SHUTDOWN_TOKEN: &str = "hermes.host.shutdown_token";
}

/// A unique, time-ordered identifier for each dispatch (UUID v7).
///
/// # Example
///
/// ```
/// use hermes_core::RequestId;
///
/// let a = RequestId::new();
/// let b = RequestId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arbitrary contextual data attached to a request.
///
/// Values are stored behind `Arc` and retrieved by key and type. Cloning an
/// `Items` shares the same underlying map.
///
/// # Example
///
/// ```
/// use hermes_core::Items;
///
/// let items = Items::new();
/// items.insert("tenant", String::from("acme"));
///
/// let tenant = items.get::<String>("tenant").unwrap();
/// assert_eq!(tenant.as_str(), "acme");
/// assert!(items.get::<u32>("tenant").is_none());
/// ```
#[derive(Clone, Default)]
pub struct Items {
    entries: Arc<RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>>,
}

impl Items {
    /// Creates an empty item map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any previous value under the same key.
    pub fn insert<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.entries.write().insert(key.into(), Arc::new(value));
    }

    /// Returns the value stored under `key` if it has type `T`.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.entries
            .read()
            .get(key)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Returns `true` if a value is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Removes the value stored under `key`, returning whether one existed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Returns the number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if no items are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for Items {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();
        f.debug_struct("Items").field("keys", &keys).finish()
    }
}
