//! Isolation bulkheads.
//!
//! `Semaphore` isolation runs the call on the caller's task and only bounds
//! concurrency per service. `Thread` isolation runs it as its own task,
//! bounded by the named pool's permits. Saturation never waits: the call is
//! rejected straight away.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::{ClientConfig, ServiceConfig};
use crate::http::ServiceId;

/// Where a protected call executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Isolation {
    Semaphore,
    Thread(String),
}

impl Isolation {
    pub fn for_service(config: &ServiceConfig) -> Self {
        match &config.isolation_thread_pool_override {
            Some(pool) => Isolation::Thread(pool.clone()),
            None => Isolation::Semaphore,
        }
    }
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Isolation::Semaphore => f.write_str("semaphore"),
            Isolation::Thread(pool) => write!(f, "thread({})", pool),
        }
    }
}

/// Bulkhead saturated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkheadFull {
    pub isolation: Isolation,
    pub limit: usize,
}

impl fmt::Display for BulkheadFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bulkhead full ({} concurrent)", self.isolation, self.limit)
    }
}

#[derive(Debug)]
struct Gate {
    limit: usize,
    semaphore: Arc<Semaphore>,
}

impl Gate {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
        }
    }
}

/// Semaphores keyed by service (semaphore mode) and by pool name (thread mode).
#[derive(Debug, Default)]
pub struct Bulkheads {
    services: DashMap<ServiceId, Gate>,
    pools: DashMap<String, Gate>,
}

impl Bulkheads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a slot for one call, or reject.
    pub fn try_acquire(
        &self,
        service: &ServiceId,
        isolation: &Isolation,
        config: &ClientConfig,
    ) -> Result<OwnedSemaphorePermit, BulkheadFull> {
        let (semaphore, limit) = match isolation {
            Isolation::Semaphore => {
                let limit = config.service(service).max_concurrent_requests;
                (gate(&self.services, service.clone(), limit), limit)
            }
            Isolation::Thread(pool) => {
                let limit = config
                    .thread_pools
                    .get(pool)
                    .map(|p| p.max_concurrent)
                    .unwrap_or_default();
                (gate(&self.pools, pool.clone(), limit), limit)
            }
        };

        semaphore.try_acquire_owned().map_err(|_| BulkheadFull {
            isolation: isolation.clone(),
            limit,
        })
    }

    /// Free slots for a service's semaphore bulkhead, if it exists.
    pub fn available(&self, service: &ServiceId) -> Option<usize> {
        self.services.get(service).map(|g| g.semaphore.available_permits())
    }
}

/// Current semaphore for `key`, replaced when the configured limit changed.
/// Permits held on a replaced semaphore stay valid until released.
fn gate<K>(map: &DashMap<K, Gate>, key: K, limit: usize) -> Arc<Semaphore>
where
    K: std::hash::Hash + Eq,
{
    let mut entry = map.entry(key).or_insert_with(|| Gate::new(limit));
    if entry.limit != limit {
        *entry = Gate::new(limit);
    }
    entry.semaphore.clone()
}
