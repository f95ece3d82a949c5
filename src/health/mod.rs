//! Candidate health subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe each configured candidate through the TransportExecutor
//!     → ServerCandidate::mark_success / mark_failure
//!
//! Passive health checks (resilience::retries):
//!     Attempt outcome observed
//!     → retriable failure marks the candidate, any response marks it alive
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - State transitions require consecutive successes/failures (hysteresis)
//! - Health state is per-candidate, not per-service
//! - Unhealthy candidates are skipped, unless every candidate is unhealthy

pub mod active;

pub use active::HealthMonitor;
