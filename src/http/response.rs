//! Response value type.
//!
//! # Responsibilities
//! - Represent a backend answer: status, reason, headers, body
//! - Convert from the native `http::Response` shape used by transports and local handlers
//! - Buffer streamed bodies on demand (error mapping needs the body)
//!
//! # Design Decisions
//! - Streamed bodies are single-read (consumed by `into_body`/`buffer`)
//! - Buffered bodies are replayable (`Bytes` is cheap to clone)

use axum::body::{Body, Bytes};
use axum::http::{self, StatusCode};

use crate::http::request::Headers;

/// Body of a [`Response`].
#[derive(Debug)]
pub enum ResponseBody {
    Empty,
    Buffered(Bytes),
    Streamed(Body),
}

/// An immutable response returned by a transport, a local handler, or a fallback.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    reason: Option<String>,
    headers: Headers,
    body: ResponseBody,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            headers: Headers::new(),
            body: ResponseBody::Empty,
        }
    }

    /// Build a buffered response, mostly useful for fallbacks and tests.
    pub fn buffered(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            body: ResponseBody::Buffered(body.into()),
            ..Self::new(status)
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Wrap a native response; its body stays streamed.
    pub fn from_http(response: http::Response<Body>) -> Self {
        let (parts, body) = response.into_parts();
        let headers = parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        Self {
            status: parts.status,
            reason: None,
            headers,
            body: ResponseBody::Streamed(body),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Reason phrase, falling back to the canonical one for the status.
    pub fn reason(&self) -> &str {
        self.reason
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("")
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Buffered body bytes, if the body has already been read.
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Buffered(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn is_streamed(&self) -> bool {
        matches!(self.body, ResponseBody::Streamed(_))
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Read a streamed body into memory, up to `limit` bytes.
    pub async fn buffer(self, limit: usize) -> Result<Response, axum::Error> {
        let body = match self.body {
            ResponseBody::Streamed(body) => ResponseBody::Buffered(axum::body::to_bytes(body, limit).await?),
            other => other,
        };
        Ok(Response { body, ..self })
    }

    /// Consume the response and return its body bytes.
    pub async fn into_bytes(self, limit: usize) -> Result<Bytes, axum::Error> {
        match self.body {
            ResponseBody::Empty => Ok(Bytes::new()),
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streamed(body) => axum::body::to_bytes(body, limit).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_http_is_streamed_until_buffered() {
        let native = http::Response::builder()
            .status(503)
            .header("retry-after", "1")
            .body(Body::from("busy"))
            .unwrap();

        let response = Response::from_http(native);
        assert!(response.is_streamed());
        assert!(response.bytes().is_none());
        assert_eq!(response.headers().get("Retry-After"), Some("1"));
        assert_eq!(response.reason(), "Service Unavailable");

        let response = response.buffer(1024).await.unwrap();
        assert_eq!(response.bytes().unwrap().as_ref(), b"busy");
        // Buffered bodies can be read again
        assert_eq!(response.bytes().unwrap().as_ref(), b"busy");
    }

    #[tokio::test]
    async fn test_buffer_respects_limit() {
        let native = http::Response::new(Body::from(vec![0u8; 64]));
        let response = Response::from_http(native);
        assert!(response.buffer(16).await.is_err());
    }

    #[test]
    fn test_custom_reason() {
        let response = Response::new(StatusCode::OK).with_reason("Fine");
        assert_eq!(response.reason(), "Fine");
    }
}
