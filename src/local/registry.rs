//! Local handler registry.
//!
//! Maps a service id to an in-process `axum::Router`. Registrations can come
//! and go at any time; lookups are a sharded map read.

use axum::Router;
use dashmap::DashMap;
use tower_http::trace::TraceLayer;

use crate::http::ServiceId;

/// Service id → in-process handler.
#[derive(Debug, Default)]
pub struct LocalHandlerRegistry {
    handlers: DashMap<ServiceId, Router>,
}

impl LocalHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `service`.
    pub fn register(&self, service: impl Into<ServiceId>, router: Router) {
        let service = service.into();
        tracing::info!(service = %service, "Local handler registered");
        self.handlers
            .insert(service, router.layer(TraceLayer::new_for_http()));
    }

    pub fn deregister(&self, service: &ServiceId) -> bool {
        let removed = self.handlers.remove(service).is_some();
        if removed {
            tracing::info!(service = %service, "Local handler removed");
        }
        removed
    }

    pub fn contains(&self, service: &ServiceId) -> bool {
        self.handlers.contains_key(service)
    }

    /// Handler for `service`; routers are cheap to clone.
    pub fn lookup(&self, service: &ServiceId) -> Option<Router> {
        self.handlers.get(service).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
