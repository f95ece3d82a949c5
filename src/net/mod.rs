//! Network transport subsystem.
//!
//! # Data Flow
//! ```text
//! Retry executor picks ServerCandidate
//!     → TransportExecutor::send(candidate, request)
//!         - client.rs (hyper-util pooled client, default)
//!         - any other implementation (tests, custom stacks)
//!     → Response (streamed body) or typed TransportError
//! ```
//!
//! # Design Decisions
//! - Transports report typed errors (connect/timeout/protocol), never raw io errors
//! - Deadlines are enforced by the caller (resilience::timeouts), not here
//! - Dropping the returned future cancels the call and releases the socket

use async_trait::async_trait;

use crate::error::TransportError;
use crate::http::{Request, Response};
use crate::load_balancer::ServerCandidate;

pub mod client;

pub use client::HyperTransport;

/// Performs the actual socket I/O for one attempt.
#[async_trait]
pub trait TransportExecutor: Send + Sync + std::fmt::Debug {
    async fn send(&self, server: &ServerCandidate, request: &Request) -> Result<Response, TransportError>;
}
