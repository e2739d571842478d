//! Request and response values passed between the agent and its host.

use bytes::Bytes;
use reqwest::{Method, Url};

/// An intercepted request.
///
/// The URL is absolute; its normalized, fragment-free form is the request's
/// identity in the cache store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: String,
    /// Request headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Request body (empty for `GET`).
    pub body: Bytes,
}

impl Request {
    /// Creates a `GET` request with no headers.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a request with the given method and no headers or body.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the cache key for this request, or `None` if the URL does not parse.
    #[must_use]
    pub fn cache_key(&self) -> Option<String> {
        cache_key(&self.url)
    }

    /// Returns true if this request may be answered from a cache entry.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }
}

/// Normalizes a URL into the key that identifies a cache entry.
///
/// Scheme and host are lowercased, an empty path becomes `/` and the
/// fragment is dropped, so every spelling of a URL maps to the key stored
/// by install.
#[must_use]
pub fn cache_key(url: &str) -> Option<String> {
    let mut url = Url::parse(url).ok()?;
    url.set_fragment(None);
    Some(url.into())
}

/// A complete, buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response with the given status and body and no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns true for a 2xx status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns the first header with the given name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
