//! Default transport executor built on the hyper-util pooled client.
//!
//! # Responsibilities
//! - Turn a `Request` + `ServerCandidate` into a native `http::Request`
//! - Propagate the correlation ID as `x-request-id`
//! - Classify client errors into connect vs protocol failures

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use axum::http::{self, Uri};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::http::{Request, Response, X_REQUEST_ID};
use crate::load_balancer::{Scheme, ServerCandidate};
use crate::net::TransportExecutor;

/// Plain-HTTP transport backed by a pooled hyper client.
#[derive(Clone, Debug)]
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
}

impl HyperTransport {
    pub fn new(config: &TransportConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(config.connect_timeout_ms)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .build(connector);

        Self { client }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(&TransportConfig::default())
    }
}

/// Build the native request for one attempt.
pub(crate) fn to_native(server: &ServerCandidate, request: &Request) -> Result<http::Request<Body>, TransportError> {
    let uri = format!("{}{}", server.base_url(), request.path());
    native_request(&uri, request).map_err(TransportError::Protocol)
}

/// Native request for `uri` carrying the request's method, headers, body and
/// correlation id. Shared with the in-process adapter.
pub(crate) fn native_request(uri: &str, request: &Request) -> Result<http::Request<Body>, String> {
    let uri: Uri = uri.parse().map_err(|e| format!("invalid uri: {}", e))?;

    let mut builder = http::Request::builder().method(request.method().clone()).uri(uri);
    let headers = builder
        .headers_mut()
        .ok_or_else(|| "invalid request head".to_string())?;

    for (name, value) in request.headers().iter() {
        if name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
            continue;
        }
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| format!("invalid header name '{}'", name))?;
        let value = HeaderValue::from_str(value).map_err(|_| format!("invalid value for header '{}'", name))?;
        headers.append(name, value);
    }
    if let Some(content_type) = request.content_type() {
        let value = HeaderValue::from_str(&content_type).map_err(|_| "invalid content-type".to_string())?;
        headers.insert(CONTENT_TYPE, value);
    }
    if !headers.contains_key(X_REQUEST_ID) {
        let value = HeaderValue::from_str(&request.correlation_id().to_string())
            .map_err(|_| "invalid correlation id".to_string())?;
        headers.insert(X_REQUEST_ID, value);
    }

    let body = match request.body() {
        Some(body) => Body::from(body.bytes.clone()),
        None => Body::empty(),
    };
    builder.body(body).map_err(|e| e.to_string())
}

#[async_trait]
impl TransportExecutor for HyperTransport {
    async fn send(&self, server: &ServerCandidate, request: &Request) -> Result<Response, TransportError> {
        if server.scheme() == Scheme::Https {
            return Err(TransportError::Protocol(format!(
                "{} requires a TLS-capable transport",
                server
            )));
        }

        let native = to_native(server, request)?;
        tracing::trace!(
            correlation_id = %request.correlation_id(),
            server = %server,
            method = %request.method(),
            path = %request.path(),
            "Sending request"
        );

        match self.client.request(native).await {
            Ok(response) => Ok(Response::from_http(response.map(Body::new))),
            Err(e) if e.is_connect() => Err(TransportError::Connect(e.to_string())),
            Err(e) => Err(TransportError::Protocol(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_request_carries_correlation_and_headers() {
        let server = ServerCandidate::new("127.0.0.1", 8080, Scheme::Http);
        let request = Request::builder("orders")
            .path("/v1/items?limit=2")
            .header("accept", "application/json")
            .header("x-tag", "a")
            .header("x-tag", "b")
            .text("hello", "utf-8")
            .build();

        let native = to_native(&server, &request).unwrap();
        assert_eq!(native.uri().to_string(), "http://127.0.0.1:8080/v1/items?limit=2");
        assert_eq!(native.headers().get_all("x-tag").iter().count(), 2);
        assert_eq!(
            native.headers().get(X_REQUEST_ID).unwrap().to_str().unwrap(),
            request.correlation_id().to_string()
        );
        assert_eq!(
            native.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_invalid_header_is_protocol_error() {
        let server = ServerCandidate::new("127.0.0.1", 8080, Scheme::Http);
        let request = Request::builder("orders").header("bad header", "x").build();
        assert!(matches!(
            to_native(&server, &request),
            Err(TransportError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_https_candidate_rejected() {
        let transport = HyperTransport::default();
        let server = ServerCandidate::new("example.internal", 443, Scheme::Https);
        let err = transport
            .send(&server, &Request::get("orders", "/"))
            .await
            .unwrap_err();
        match err {
            TransportError::Protocol(msg) => assert!(msg.contains("requires a TLS-capable transport")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
