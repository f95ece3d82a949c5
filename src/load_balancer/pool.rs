//! Candidate set management.
//!
//! # Responsibilities
//! - Map service identifiers to their current candidate sets
//! - Refresh candidate sets at runtime without disturbing in-flight selections
//! - Keep one selection strategy (and its cursor) per service

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::ClientConfig;
use crate::http::ServiceId;
use crate::load_balancer::{LoadBalancer, Strategy, backend::ServerCandidate};

/// Resolves a service identifier to its candidate servers.
///
/// Called once per attempt; implementations must be cheap and must reflect
/// membership changes made out of band.
pub trait CandidateResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, service: &ServiceId) -> Vec<Arc<ServerCandidate>>;
}

/// Resolver backed by configuration, refreshable at runtime.
#[derive(Debug, Default)]
pub struct StaticResolver {
    /// Map of service id -> candidate set (replaced wholesale on refresh).
    groups: DashMap<ServiceId, Arc<[Arc<ServerCandidate>]>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a resolver from the `services` section of a config.
    pub fn from_config(config: &ClientConfig) -> Self {
        let resolver = Self::new();
        resolver.sync_from(config);
        resolver
    }

    /// Replace the candidate set of one service.
    ///
    /// Candidates whose address is unchanged keep their identity, so
    /// in-flight counters and health state survive the refresh.
    pub fn refresh(&self, service: &ServiceId, candidates: Vec<ServerCandidate>) {
        let previous = self.groups.get(service).map(|g| g.value().clone());
        let mut seen = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            if seen.iter().any(|c: &Arc<ServerCandidate>| c.same_address(&candidate)) {
                continue;
            }
            let reused = previous
                .as_ref()
                .and_then(|prev| prev.iter().find(|c| c.same_address(&candidate)).cloned());
            seen.push(reused.unwrap_or_else(|| Arc::new(candidate)));
        }

        tracing::debug!(service = %service, candidates = seen.len(), "Candidate set refreshed");
        self.groups.insert(service.clone(), Arc::from(seen));
    }

    /// Drop a service entirely.
    pub fn remove(&self, service: &ServiceId) {
        self.groups.remove(service);
    }

    /// Refresh every service from config and forget services no longer listed.
    pub fn sync_from(&self, config: &ClientConfig) {
        let mut listed = HashSet::new();
        for (name, service_config) in &config.services {
            let service = ServiceId::new(name);
            let mut candidates = Vec::with_capacity(service_config.candidates.len());
            for raw in &service_config.candidates {
                match ServerCandidate::parse(raw, service_config.protocol) {
                    Ok(candidate) => candidates.push(candidate),
                    Err(e) => tracing::warn!(service = %service, error = %e, "Ignoring invalid candidate"),
                }
            }
            self.refresh(&service, candidates);
            listed.insert(service);
        }
        self.groups.retain(|service, _| listed.contains(service));
    }

    /// Return a list of all candidates (for health checking).
    pub fn all_candidates(&self) -> Vec<Arc<ServerCandidate>> {
        self.groups
            .iter()
            .flat_map(|group| group.value().iter().cloned().collect::<Vec<_>>())
            .collect()
    }
}

impl CandidateResolver for StaticResolver {
    fn resolve(&self, service: &ServiceId) -> Vec<Arc<ServerCandidate>> {
        self.groups
            .get(service)
            .map(|group| group.value().to_vec())
            .unwrap_or_default()
    }
}

/// Per-service selection strategies.
#[derive(Debug, Default)]
pub struct Balancers {
    /// Map of service id -> (configured strategy, live balancer).
    by_service: DashMap<ServiceId, (Strategy, Arc<dyn LoadBalancer>)>,
}

impl Balancers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balancer for `service`, rebuilt if the configured strategy changed.
    pub fn get(&self, service: &ServiceId, strategy: Strategy) -> Arc<dyn LoadBalancer> {
        if let Some(entry) = self.by_service.get(service) {
            if entry.0 == strategy {
                return entry.1.clone();
            }
        }
        let balancer: Arc<dyn LoadBalancer> = Arc::from(strategy.build());
        self.by_service.insert(service.clone(), (strategy, balancer.clone()));
        balancer
    }

    /// Select a candidate, preferring ones not in `exclude`.
    pub fn select(
        &self,
        service: &ServiceId,
        strategy: Strategy,
        candidates: &[Arc<ServerCandidate>],
        exclude: &[Arc<ServerCandidate>],
    ) -> Option<Arc<ServerCandidate>> {
        let balancer = self.get(service, strategy);
        if !exclude.is_empty() {
            let fresh: Vec<Arc<ServerCandidate>> = candidates
                .iter()
                .filter(|c| !exclude.iter().any(|e| e.same_address(c)))
                .cloned()
                .collect();
            if !fresh.is_empty() {
                return balancer.next_server(&fresh);
            }
        }
        balancer.next_server(candidates)
    }
}
