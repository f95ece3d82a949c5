//! Round-robin load balancing strategy.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::{LoadBalancer, backend::ServerCandidate};

/// Round-robin selector.
/// Stores an internal counter to rotate through candidates.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server(&self, candidates: &[Arc<ServerCandidate>]) -> Option<Arc<ServerCandidate>> {
        if candidates.is_empty() {
            return None;
        }

        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = candidates.len();

        for i in 0..len {
            let candidate = &candidates[(start + i) % len];
            if candidate.is_healthy() {
                return Some(candidate.clone());
            }
        }
        // All unhealthy: keep rotating rather than failing the call outright
        Some(candidates[start % len].clone())
    }
}
