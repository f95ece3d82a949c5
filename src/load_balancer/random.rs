//! Random load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{LoadBalancer, backend::ServerCandidate};

/// Uniform random selector over healthy candidates.
#[derive(Debug, Default)]
pub struct RandomChoice;

impl RandomChoice {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RandomChoice {
    fn next_server(&self, candidates: &[Arc<ServerCandidate>]) -> Option<Arc<ServerCandidate>> {
        if candidates.is_empty() {
            return None;
        }
        let healthy: Vec<&Arc<ServerCandidate>> = candidates.iter().filter(|c| c.is_healthy()).collect();
        if healthy.is_empty() {
            return Some(candidates[fastrand::usize(..candidates.len())].clone());
        }
        Some(healthy[fastrand::usize(..healthy.len())].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::Scheme;

    #[test]
    fn test_random_only_picks_healthy() {
        let lb = RandomChoice::new();
        let c1 = Arc::new(ServerCandidate::new("127.0.0.1", 8080, Scheme::Http));
        let c2 = Arc::new(ServerCandidate::new("127.0.0.1", 8081, Scheme::Http));
        c1.mark_failure(1);
        let candidates = vec![c1, c2];

        for _ in 0..32 {
            assert_eq!(lb.next_server(&candidates).unwrap().port(), 8081);
        }
    }
}
