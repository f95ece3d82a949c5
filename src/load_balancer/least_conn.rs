//! Least Connections load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{LoadBalancer, backend::ServerCandidate};

/// Least connections selector.
/// Selects the healthy candidate with the fewest in-flight requests.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn next_server(&self, candidates: &[Arc<ServerCandidate>]) -> Option<Arc<ServerCandidate>> {
        // In case of tie, the first one is selected (stability)
        candidates
            .iter()
            .filter(|c| c.is_healthy())
            .min_by_key(|c| c.active_requests())
            .or_else(|| candidates.iter().min_by_key(|c| c.active_requests()))
            .cloned()
    }
}
