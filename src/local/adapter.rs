//! In-process transport adapter.
//!
//! # Responsibilities
//! - Decide whether a service can be served in-process (registry + locality policy)
//! - Map a `Request` onto the handler's native request without network I/O
//! - Report unrepresentable requests as `LocalError::NotSupported`
//!
//! # Design Decisions
//! - `NotSupported` is a distinct signal, never an I/O failure; the gateway
//!   falls back to the network path on it
//! - Locality is configuration-driven (`[local]`), not hostname sniffing
//! - Local responses are buffered so they behave like any other buffered response

use std::sync::Arc;

use tower::ServiceExt;
use uuid::Uuid;

use crate::config::LocalConfig;
use crate::error::LocalError;
use crate::http::{Request, Response, ServiceId, X_REQUEST_ID};
use crate::load_balancer::CandidateResolver;
use crate::local::registry::LocalHandlerRegistry;
use crate::net::client::native_request;

/// Serves registered services in-process.
#[derive(Debug, Clone)]
pub struct LocalAdapter {
    registry: Arc<LocalHandlerRegistry>,
}

impl LocalAdapter {
    pub fn new(registry: Arc<LocalHandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<LocalHandlerRegistry> {
        &self.registry
    }

    /// Cheap check made before every request.
    pub fn can_handle(&self, service: &ServiceId, policy: &LocalConfig, resolver: &dyn CandidateResolver) -> bool {
        if !policy.enabled || !self.registry.contains(service) {
            return false;
        }
        if !policy.require_colocated_candidates {
            return true;
        }
        let candidates = resolver.resolve(service);
        !candidates.is_empty() && candidates.iter().all(|c| policy.is_colocated(c.host()))
    }

    /// Run `request` against its registered handler.
    pub async fn execute(&self, request: &Request, body_limit: usize) -> Result<Response, LocalError> {
        let service = request
            .service()
            .ok_or_else(|| LocalError::NotSupported("request has no service id".to_string()))?;
        let router = self
            .registry
            .lookup(service)
            .ok_or_else(|| LocalError::NotSupported(format!("no local handler for {}", service)))?;

        if let Some(raw) = request.headers().get(X_REQUEST_ID) {
            if Uuid::parse_str(raw).is_err() {
                return Err(LocalError::NotSupported(format!("malformed {} '{}'", X_REQUEST_ID, raw)));
            }
        }
        if !request.path().starts_with('/') {
            return Err(LocalError::NotSupported(format!("path '{}' is not origin-form", request.path())));
        }
        let native = native_request(request.path(), request).map_err(LocalError::NotSupported)?;

        tracing::debug!(
            service = %service,
            correlation_id = %request.correlation_id(),
            path = %request.path(),
            "Dispatching in-process"
        );

        let response = match router.oneshot(native).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        Response::from_http(response)
            .buffer(body_limit)
            .await
            .map_err(|e| LocalError::Handler(e.to_string()))
    }
}
