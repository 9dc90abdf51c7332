//! Caller identity.
//!
//! The host never validates an identity. Whatever the embedding caller sets
//! as the host's user is copied into each request and handed to the handler.

use serde::{Deserialize, Serialize};

/// An authenticated end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Stable user identifier.
    pub user_id: String,
    /// Display name, if known.
    pub name: Option<String>,
}

/// A calling service, identified by its SPIFFE ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    /// SPIFFE ID (e.g. `spiffe://example.org/orders`).
    pub spiffe_id: String,
}

/// Identity of the caller on whose behalf a request is dispatched.
///
/// # Example
///
/// ```
/// use hermes_core::CallerIdentity;
///
/// let identity = CallerIdentity::user("u-42", "Alice");
/// assert_eq!(identity.log_id(), "user:u-42");
/// assert!(!identity.is_anonymous());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallerIdentity {
    /// No caller identity.
    #[default]
    Anonymous,
    /// An end user.
    User(UserIdentity),
    /// Another service.
    Service(ServiceIdentity),
}

impl CallerIdentity {
    /// Creates an anonymous identity.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self::Anonymous
    }

    /// Creates a user identity with a display name.
    pub fn user(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::User(UserIdentity {
            user_id: user_id.into(),
            name: Some(name.into()),
        })
    }

    /// Creates a service identity.
    pub fn service(spiffe_id: impl Into<String>) -> Self {
        Self::Service(ServiceIdentity {
            spiffe_id: spiffe_id.into(),
        })
    }

    /// Returns `true` for [`CallerIdentity::Anonymous`].
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Returns a string identifier suitable for logging.
    ///
    /// Never contains anything beyond the identifier itself.
    #[must_use]
    pub fn log_id(&self) -> String {
        match self {
            Self::Anonymous => "anonymous".to_string(),
            Self::User(u) => format!("user:{}", u.user_id),
            Self::Service(s) => s.spiffe_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_anonymous() {
        let identity = CallerIdentity::default();
        assert!(identity.is_anonymous());
        assert_eq!(identity.log_id(), "anonymous");
    }

    #[test]
    fn test_service_log_id() {
        let identity = CallerIdentity::service("spiffe://example.org/orders");
        assert_eq!(identity.log_id(), "spiffe://example.org/orders");
    }

    #[test]
    fn test_user_without_name() {
        let identity = CallerIdentity::User(UserIdentity {
            user_id: "u1".to_string(),
            name: None,
        });
        assert_eq!(identity.log_id(), "user:u1");
    }

    #[test]
    fn test_serialization_tag() {
        let identity = CallerIdentity::user("u1", "Alice");
        let json = serde_json::to_string(&identity).expect("serialization should work");
        assert!(json.contains("\"type\":\"user\""));

        let parsed: CallerIdentity =
            serde_json::from_str(&json).expect("deserialization should work");
        assert_eq!(identity, parsed);
    }
}
