//! Synthetic inbound request.

use std::collections::HashMap;

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::Method;
use percent_encoding::percent_decode_str;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use hermes_core::{CallerIdentity, RequestId};

/// Posted form fields.
pub type FormData = HashMap<String, String>;

/// Base used to resolve relative targets such as `/echo`.
const DEFAULT_BASE: &str = "http://localhost/";

/// Errors raised while customizing a request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Header name is not a valid HTTP token.
    #[error("invalid header name: {0}")]
    InvalidHeaderName(String),

    /// Header value contains forbidden characters.
    #[error("invalid value for header {name}")]
    InvalidHeaderValue {
        /// The header whose value was rejected.
        name: String,
    },
}

/// An in-memory stand-in for an inbound request.
///
/// The preparation step passed to `dispatch` receives `&mut SyntheticRequest`
/// and may change the method and headers. Once the handler starts, the
/// request is shared immutably; only its cancellation state can change.
#[derive(Debug)]
pub struct SyntheticRequest {
    id: RequestId,
    url: Url,
    local_path: String,
    method: Method,
    headers: HeaderMap,
    form: FormData,
    user: CallerIdentity,
    abort: CancellationToken,
}

impl SyntheticRequest {
    pub(crate) fn new(
        url: Url,
        abort: CancellationToken,
        form: Option<FormData>,
        user: CallerIdentity,
    ) -> Self {
        let method = if form.is_some() {
            Method::POST
        } else {
            Method::GET
        };
        Self {
            id: RequestId::new(),
            local_path: local_path_of(&url),
            url,
            method,
            headers: HeaderMap::new(),
            form: form.unwrap_or_default(),
            user,
            abort,
        }
    }

    /// Returns the ID assigned to this dispatch.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.id
    }

    /// Returns the full target URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the percent-decoded path used for routing.
    #[must_use]
    pub fn local_path(&self) -> &str {
        &self.local_path
    }

    /// Returns the decoded query string pairs, in order.
    #[must_use]
    pub fn query(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Returns the first query value for `name`.
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Sets the request method.
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Returns all request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Sets a header, replacing any existing value.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), RequestError> {
        let header_name = HeaderName::try_from(name)
            .map_err(|_| RequestError::InvalidHeaderName(name.to_string()))?;
        let header_value =
            HeaderValue::try_from(value).map_err(|_| RequestError::InvalidHeaderValue {
                name: name.to_string(),
            })?;
        self.headers.insert(header_name, header_value);
        Ok(())
    }

    /// Sets several headers; stops at the first invalid one.
    pub fn set_headers<'a, I>(&mut self, headers: I) -> Result<(), RequestError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (name, value) in headers {
            self.set_header(name, value)?;
        }
        Ok(())
    }

    /// Sets the `User-Agent` header.
    pub fn set_user_agent(&mut self, user_agent: &str) -> Result<(), RequestError> {
        self.set_header(header::USER_AGENT.as_str(), user_agent)
    }

    /// Sets the `Accept` header.
    pub fn set_accept(&mut self, accept: &str) -> Result<(), RequestError> {
        self.set_header(header::ACCEPT.as_str(), accept)
    }

    /// Returns the posted form fields (empty for requests without a body).
    #[must_use]
    pub const fn form(&self) -> &FormData {
        &self.form
    }

    /// Returns a single posted field.
    #[must_use]
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }

    /// Returns the caller identity captured from the host.
    #[must_use]
    pub const fn user(&self) -> &CallerIdentity {
        &self.user
    }

    /// Cancels this request.
    ///
    /// Does not touch the host's shutdown signal.
    pub fn abort(&self) {
        self.abort.cancel();
    }

    /// Returns `true` once the request has been aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Returns a handle that can abort this request from elsewhere.
    ///
    /// Typically captured in the preparation step.
    #[must_use]
    pub fn abort_handle(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Returns the per-request cancellation token.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.abort
    }
}

/// Parses a dispatch target, resolving relative paths against `http://localhost/`.
///
/// Returns `None` for unparsable targets and for URLs without a hierarchical
/// path such as `mailto:echo`.
pub(crate) fn parse_target(target: &str) -> Option<Url> {
    let url = match Url::parse(target) {
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(DEFAULT_BASE).and_then(|base| base.join(target))
        }
        other => other,
    }
    .ok()?;

    if url.cannot_be_a_base() {
        return None;
    }
    Some(url)
}

/// Returns the percent-decoded path of `url`.
pub(crate) fn local_path_of(url: &Url) -> String {
    percent_decode_str(url.path())
        .decode_utf8_lossy()
        .into_owned()
}
