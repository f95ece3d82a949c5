//! Request value type.
//!
//! # Responsibilities
//! - Carry everything needed to issue a call: service, method, path, headers, body
//! - Generate a correlation ID (UUID v4) once, at build time
//! - Stay immutable after construction so it can be retried verbatim
//!
//! # Design Decisions
//! - Headers are an ordered multimap (duplicates allowed, insertion order kept)
//! - Absent service identifier means the path is already an absolute URL
//! - Body bytes are reference counted, so cloning a request for a retry is cheap

use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::Method;
use uuid::Uuid;

/// Header carrying the correlation ID on every outgoing call.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Logical name of a service inside the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(Arc<str>);

impl ServiceId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ServiceId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

/// Correlation ID generated for each logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ordered header multimap.
///
/// Names are compared case-insensitively; values are kept verbatim and
/// validated only when a transport converts them to its native shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.append(k, v);
        }
        headers
    }
}

/// Request body with its declared charset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody {
    pub bytes: Bytes,
    pub charset: Option<String>,
}

/// An immutable outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    service: Option<ServiceId>,
    method: Method,
    path: String,
    headers: Headers,
    body: Option<RequestBody>,
    correlation_id: CorrelationId,
}

impl Request {
    /// Start a request addressed to a logical service.
    pub fn builder(service: impl Into<ServiceId>) -> RequestBuilder {
        RequestBuilder::new(Some(service.into()))
    }

    /// Start a request whose path is already an absolute URL.
    pub fn absolute(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(None).path(url)
    }

    pub fn get(service: impl Into<ServiceId>, path: impl Into<String>) -> Self {
        Self::builder(service).path(path).build()
    }

    pub fn service(&self) -> Option<&ServiceId> {
        self.service.as_ref()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path and query (or the absolute URL when no service is set).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Same request (same correlation id) with a different path.
    pub(crate) fn with_path(&self, path: impl Into<String>) -> Request {
        Request {
            path: path.into(),
            ..self.clone()
        }
    }

    /// Value of the `content-type` header to send, including the body charset.
    pub fn content_type(&self) -> Option<String> {
        let declared = self.headers.get("content-type");
        let charset = self.body.as_ref().and_then(|b| b.charset.as_deref());
        match (declared, charset) {
            (Some(ct), Some(cs)) if !ct.to_ascii_lowercase().contains("charset=") => {
                Some(format!("{}; charset={}", ct, cs))
            }
            (Some(ct), _) => Some(ct.to_string()),
            (None, Some(cs)) => Some(format!("text/plain; charset={}", cs)),
            (None, None) => None,
        }
    }
}

/// Builder for [`Request`].
#[derive(Debug)]
pub struct RequestBuilder {
    service: Option<ServiceId>,
    method: Method,
    path: String,
    headers: Headers,
    body: Option<RequestBody>,
}

impl RequestBuilder {
    fn new(service: Option<ServiceId>) -> Self {
        Self {
            service,
            method: Method::GET,
            path: "/".to_string(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody {
            bytes: bytes.into(),
            charset: None,
        });
        self
    }

    pub fn text(mut self, text: impl Into<String>, charset: impl Into<String>) -> Self {
        self.body = Some(RequestBody {
            bytes: Bytes::from(text.into()),
            charset: Some(charset.into()),
        });
        self
    }

    pub fn build(self) -> Request {
        Request {
            service: self.service,
            method: self.method,
            path: self.path,
            headers: self.headers,
            body: self.body,
            correlation_id: CorrelationId::new(),
        }
    }
}
