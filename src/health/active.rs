//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every configured candidate
//! - Update candidate health state based on results

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::config::ConfigStore;
use crate::http::{Request, ServiceId};
use crate::load_balancer::{CandidateResolver, ServerCandidate};
use crate::net::TransportExecutor;
use crate::observability::metrics;

pub struct HealthMonitor {
    store: Arc<ConfigStore>,
    resolver: Arc<dyn CandidateResolver>,
    transport: Arc<dyn TransportExecutor>,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<ConfigStore>,
        resolver: Arc<dyn CandidateResolver>,
        transport: Arc<dyn TransportExecutor>,
    ) -> Self {
        Self {
            store,
            resolver,
            transport,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let config = self.store.snapshot().health_check.clone();
        if !config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = config.interval_secs,
            path = %config.path,
            "Health monitor starting"
        );

        let interval = Duration::from_secs(config.interval_secs.max(1));
        let mut ticker = time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe each distinct candidate of every configured service once.
    pub async fn check_all(&self) {
        let config = self.store.snapshot();
        let health = &config.health_check;
        let timeout = Duration::from_secs(health.timeout_secs);

        let mut seen = HashSet::new();
        for name in config.services.keys() {
            let service = ServiceId::new(name);
            for candidate in self.resolver.resolve(&service) {
                if !seen.insert(candidate.base_url()) {
                    continue;
                }
                let probe = Request::builder(service.clone())
                    .path(health.path.clone())
                    .header("user-agent", "fleet-transport-health-check")
                    .build();
                let healthy = self.probe(&candidate, &probe, timeout).await;

                let changed = if healthy {
                    candidate.mark_success(health.healthy_threshold as usize)
                } else {
                    candidate.mark_failure(health.unhealthy_threshold as usize)
                };
                if changed {
                    tracing::info!(candidate = %candidate, healthy, "Candidate health changed");
                }
                metrics::record_candidate_health(&candidate.to_string(), candidate.is_healthy());
            }
        }
    }

    async fn probe(&self, candidate: &ServerCandidate, probe: &Request, timeout: Duration) -> bool {
        match time::timeout(timeout, self.transport.send(candidate, probe)).await {
            Ok(Ok(response)) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(candidate = %candidate, status = %response.status(), "Health check failed: non-success status");
                }
                success
            }
            Ok(Err(e)) => {
                tracing::warn!(candidate = %candidate, error = %e, "Health check failed: transport error");
                false
            }
            Err(_) => {
                tracing::warn!(candidate = %candidate, "Health check failed: timeout");
                false
            }
        }
    }
}
