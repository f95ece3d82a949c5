//! Candidate resolution and load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Service identifier
//!     → pool.rs (CandidateResolver: current candidate set, re-resolved per attempt)
//!     → Apply selection strategy (per service):
//!         - round_robin.rs (rotate through candidates)
//!         - least_conn.rs (pick candidate with fewest in-flight requests)
//!         - random.rs (uniform pick)
//!     → backend.rs (track in-flight request, passive health)
//! ```
//!
//! # Design Decisions
//! - Strategies are stateless apart from their own cursor; candidates track load
//! - Candidate sets are replaced wholesale on refresh (copy-on-write)
//! - Unhealthy candidates are skipped unless no healthy one is left

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod backend;
pub mod least_conn;
pub mod pool;
pub mod random;
pub mod round_robin;

pub use backend::{CandidateGuard, HealthState, Scheme, ServerCandidate};
pub use pool::{Balancers, CandidateResolver, StaticResolver};

/// Candidate selection strategy.
pub trait LoadBalancer: Send + Sync + fmt::Debug {
    /// Pick a candidate, or `None` if the slice is empty.
    fn next_server(&self, candidates: &[Arc<ServerCandidate>]) -> Option<Arc<ServerCandidate>>;
}

/// Configurable strategy names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    LeastConnections,
    Random,
}

impl Strategy {
    pub fn build(self) -> Box<dyn LoadBalancer> {
        match self {
            Strategy::RoundRobin => Box::new(round_robin::RoundRobin::new()),
            Strategy::LeastConnections => Box::new(least_conn::LeastConnections::new()),
            Strategy::Random => Box::new(random::RandomChoice::new()),
        }
    }
}
