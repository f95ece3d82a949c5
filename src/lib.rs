//! Resilient service-to-service HTTP transport.
//!
//! Callers address a logical service id; the [`Gateway`] resolves candidate
//! servers, balances and retries across them, protects each service with a
//! circuit breaker, short-cuts co-located services in-process, and hands
//! results to slow consumers on a self-tuning callback pool.
//!
//! ```text
//!   caller ──▶ Gateway ──▶ route
//!                           ├─ absolute URL ─────────────────────────▶ TransportExecutor
//!                           ├─ local ──▶ breaker ──▶ LocalAdapter (axum Router)
//!                           │                 └─ NotSupported ─▶ one network attempt
//!                           └─ balanced ─▶ breaker ─▶ bulkhead ─▶ LoadBalancedExecutor
//!                                                                   ├─ CandidateResolver
//!                                                                   └─ TransportExecutor
//!   result ──▶ caller future, or AdaptiveCallbackPool (submit / thread isolation)
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod net;

// Traffic management
pub mod health;
pub mod load_balancer;
pub mod local;

// Cross-cutting concerns
pub mod executor;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

mod util;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, FailureCause};
pub use gateway::{Fallback, Gateway, GatewayBuilder, ResponseFuture};
pub use http::{Request, Response, ServiceId};
pub use lifecycle::Shutdown;
