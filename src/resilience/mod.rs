//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Protected call for a service:
//!     → circuit_breaker.rs (permit, or short-circuit when open)
//!     → isolation.rs (bulkhead slot, semaphore or named pool)
//!     → retries.rs (pick candidate, attempt, classify, spend budget)
//!         → timeouts.rs (per-attempt deadline, cancellation)
//!         → backoff.rs (delay between attempts)
//!     → permit completed with the outcome → window.rs
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every attempt has a deadline
//! - Retries and circuit transitions are internal; only the final outcome surfaces
//! - Per-service state, never a process-wide lock

pub mod backoff;
pub mod circuit_breaker;
pub mod isolation;
pub mod retries;
pub mod timeouts;
pub mod window;

pub use backoff::Backoff;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitPermit, CircuitState, ShortCircuited};
pub use isolation::{BulkheadFull, Bulkheads, Isolation};
pub use retries::{LoadBalancedExecutor, RetryBudget, RetryStep};
pub use window::{HealthCounts, Outcome, RollingWindow};
