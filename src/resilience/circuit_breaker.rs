//! Circuit breaker for service protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: service assumed down, calls fail fast
//! - Half-Open: a single trial call tests whether the service recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: volume >= request_volume_threshold AND error% >= error_threshold_percentage
//! Open → Half-Open: sleep window elapsed, next call becomes the trial
//! Half-Open → Closed: trial succeeds (window reset)
//! Half-Open → Open: trial fails (sleep window restarts)
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker (not global), created lazily, never destroyed
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial in Half-Open (prevents hammering a recovering service)
//! - Trial slot is an RAII permit, released even if the call panics or is dropped
//! - force_open / force_closed pin the state and take precedence

use std::fmt;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::http::ServiceId;
use crate::observability::metrics;
use crate::resilience::window::{HealthCounts, Outcome, RollingWindow};
use crate::util::lock_unpoisoned;

/// Circuit state as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => f.write_str("closed"),
            CircuitState::Open => f.write_str("open"),
            CircuitState::HalfOpen => f.write_str("half-open"),
        }
    }
}

/// Returned when the breaker short-circuits a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortCircuited;

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    opened_at: Option<Instant>,
    window: RollingWindow,
}

/// Rolling-window circuit breaker for one service.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: ServiceId,
    inner: Mutex<BreakerInner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermitKind {
    /// Normal closed-state call.
    Closed,
    /// The single half-open trial.
    Trial,
    /// Circuit pinned closed: outcomes are counted but never trip it.
    Forced,
    /// Breaker disabled for the service.
    Untracked,
}

impl CircuitBreaker {
    pub fn new(service: ServiceId, config: &CircuitBreakerConfig) -> Self {
        Self {
            service,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                opened_at: None,
                window: RollingWindow::new(config.rolling_window(), config.rolling_window_buckets),
            }),
        }
    }

    pub fn service(&self) -> &ServiceId {
        &self.service
    }

    /// Current computed state (ignores force overrides).
    pub fn state(&self) -> CircuitState {
        lock_unpoisoned(&self.inner).state
    }

    /// Counts in the current rolling window.
    pub fn health_counts(&self) -> HealthCounts {
        lock_unpoisoned(&self.inner).window.counts(Instant::now())
    }

    /// Ask permission to run a call.
    pub fn try_acquire(self: &Arc<Self>, config: &CircuitBreakerConfig) -> Result<CircuitPermit, ShortCircuited> {
        if config.force_open {
            metrics::record_short_circuit(self.service.as_str());
            return Err(ShortCircuited);
        }
        if !config.enabled {
            return Ok(self.permit(PermitKind::Untracked, config));
        }
        if config.force_closed {
            return Ok(self.permit(PermitKind::Forced, config));
        }

        let mut inner = lock_unpoisoned(&self.inner);
        match inner.state {
            CircuitState::Closed => Ok(self.permit(PermitKind::Closed, config)),
            CircuitState::Open => {
                let now = Instant::now();
                let sleeping = inner
                    .opened_at
                    .map(|opened| now.saturating_duration_since(opened) < config.sleep_window())
                    .unwrap_or(false);
                if sleeping {
                    drop(inner);
                    metrics::record_short_circuit(self.service.as_str());
                    return Err(ShortCircuited);
                }
                inner.state = CircuitState::HalfOpen;
                drop(inner);
                tracing::info!(service = %self.service, "Circuit half-open, allowing trial call");
                metrics::record_circuit_state(self.service.as_str(), CircuitState::HalfOpen);
                Ok(self.permit(PermitKind::Trial, config))
            }
            CircuitState::HalfOpen => {
                drop(inner);
                metrics::record_short_circuit(self.service.as_str());
                Err(ShortCircuited)
            }
        }
    }

    /// Record an outcome that happened without a permit (e.g. a rejection
    /// before the call could start).
    pub fn record_outcome(&self, outcome: Outcome, config: &CircuitBreakerConfig) {
        if !config.enabled || config.force_open {
            return;
        }
        self.record(PermitKind::Closed, Some(outcome), config);
    }

    fn permit(self: &Arc<Self>, kind: PermitKind, config: &CircuitBreakerConfig) -> CircuitPermit {
        CircuitPermit {
            breaker: self.clone(),
            kind,
            config: config.clone(),
            completed: false,
        }
    }

    fn record(&self, kind: PermitKind, outcome: Option<Outcome>, config: &CircuitBreakerConfig) {
        let now = Instant::now();
        let mut inner = lock_unpoisoned(&self.inner);
        if inner.window.length() != config.rolling_window() {
            inner.window = RollingWindow::new(config.rolling_window(), config.rolling_window_buckets);
        }

        match kind {
            PermitKind::Untracked => {}
            PermitKind::Forced => {
                if let Some(outcome) = outcome {
                    inner.window.record(outcome, now);
                }
            }
            PermitKind::Closed => {
                let Some(outcome) = outcome else { return };
                inner.window.record(outcome, now);
                if inner.state != CircuitState::Closed {
                    return;
                }
                let counts = inner.window.counts(now);
                if counts.total() >= u64::from(config.request_volume_threshold)
                    && counts.error_percentage() >= config.error_threshold_percentage
                {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    drop(inner);
                    tracing::warn!(
                        service = %self.service,
                        requests = counts.total(),
                        error_percentage = counts.error_percentage(),
                        "Circuit opened"
                    );
                    metrics::record_circuit_state(self.service.as_str(), CircuitState::Open);
                }
            }
            PermitKind::Trial => match outcome {
                Some(Outcome::Success) => {
                    inner.state = CircuitState::Closed;
                    inner.opened_at = None;
                    inner.window.reset();
                    drop(inner);
                    tracing::info!(service = %self.service, "Trial call succeeded, circuit closed");
                    metrics::record_circuit_state(self.service.as_str(), CircuitState::Closed);
                }
                Some(_) => {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    drop(inner);
                    tracing::warn!(service = %self.service, "Trial call failed, circuit re-opened");
                    metrics::record_circuit_state(self.service.as_str(), CircuitState::Open);
                }
                None => {
                    // No verdict: release the slot, the next call may try again
                    inner.state = CircuitState::Open;
                    drop(inner);
                    metrics::record_circuit_state(self.service.as_str(), CircuitState::Open);
                }
            },
        }
    }
}

/// Permission to run one call; report how it went with [`CircuitPermit::complete`].
///
/// Dropping an uncompleted permit releases it: a trial counts as failed,
/// other calls record nothing.
#[derive(Debug)]
pub struct CircuitPermit {
    breaker: Arc<CircuitBreaker>,
    kind: PermitKind,
    config: CircuitBreakerConfig,
    completed: bool,
}

impl CircuitPermit {
    pub fn is_trial(&self) -> bool {
        self.kind == PermitKind::Trial
    }

    /// Report the outcome. `None` releases the permit without a verdict.
    pub fn complete(mut self, outcome: Option<Outcome>) {
        self.completed = true;
        self.breaker.record(self.kind, outcome, &self.config);
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        if self.kind == PermitKind::Trial {
            self.breaker.record(self.kind, Some(Outcome::Failure), &self.config);
        }
    }
}

/// Process-lifetime map of service id → breaker.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<ServiceId, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Breaker for `service`, created on first use.
    pub fn get(&self, service: &ServiceId, config: &CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(service) {
            return breaker.value().clone();
        }
        self.breakers
            .entry(service.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(service.clone(), config)))
            .value()
            .clone()
    }

    /// State of an existing breaker, honouring force overrides.
    pub fn state(&self, service: &ServiceId, config: &CircuitBreakerConfig) -> Option<CircuitState> {
        if config.force_open {
            return Some(CircuitState::Open);
        }
        if config.force_closed {
            return Some(CircuitState::Closed);
        }
        self.breakers.get(service).map(|b| b.state())
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            request_volume_threshold: 4,
            error_threshold_percentage: 50,
            sleep_window_ms: 1_000,
            ..CircuitBreakerConfig::default()
        }
    }

    fn breaker(config: &CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(ServiceId::new("orders"), config))
    }

    fn run(breaker: &Arc<CircuitBreaker>, config: &CircuitBreakerConfig, outcome: Outcome) {
        breaker.try_acquire(config).unwrap().complete(Some(outcome));
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_volume_and_error_rate() {
        let config = config();
        let cb = breaker(&config);

        run(&cb, &config, Outcome::Failure);
        run(&cb, &config, Outcome::Failure);
        run(&cb, &config, Outcome::Failure);
        // Below the volume threshold: still closed
        assert_eq!(cb.state(), CircuitState::Closed);

        // Volume reached by a success: 4 calls at 75% errors still trips
        run(&cb, &config, Outcome::Success);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire(&config).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_below_error_threshold() {
        let config = config();
        let cb = breaker(&config);
        for _ in 0..10 {
            run(&cb, &config, Outcome::Success);
            run(&cb, &config, Outcome::Success);
            run(&cb, &config, Outcome::Failure);
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_single_trial_then_close() {
        let config = config();
        let cb = breaker(&config);
        for _ in 0..4 {
            run(&cb, &config, Outcome::Failure);
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(cb.try_acquire(&config).is_err());

        tokio::time::advance(Duration::from_millis(2)).await;
        let trial = cb.try_acquire(&config).unwrap();
        assert!(trial.is_trial());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // Only one trial in flight
        assert!(cb.try_acquire(&config).is_err());

        trial.complete(Some(Outcome::Success));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.health_counts().total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_restarts_sleep_window() {
        let config = config();
        let cb = breaker(&config);
        for _ in 0..4 {
            run(&cb, &config, Outcome::Failure);
        }
        tokio::time::advance(Duration::from_millis(1_001)).await;
        cb.try_acquire(&config).unwrap().complete(Some(Outcome::Failure));
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(cb.try_acquire(&config).is_err());
        tokio::time::advance(Duration::from_millis(501)).await;
        assert!(cb.try_acquire(&config).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_releases_slot() {
        let config = config();
        let cb = breaker(&config);
        for _ in 0..4 {
            run(&cb, &config, Outcome::Failure);
        }
        tokio::time::advance(Duration::from_millis(1_001)).await;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _trial = cb.try_acquire(&config).unwrap();
            panic!("call blew up");
        }));
        assert!(result.is_err());
        // Slot released, counted as a failed trial
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_neutral_trial_allows_next_call() {
        let config = config();
        let cb = breaker(&config);
        for _ in 0..4 {
            run(&cb, &config, Outcome::Failure);
        }
        tokio::time::advance(Duration::from_millis(1_001)).await;
        cb.try_acquire(&config).unwrap().complete(None);
        assert!(cb.try_acquire(&config).unwrap().is_trial());
    }

    #[test]
    fn test_force_overrides() {
        let mut config = config();
        let cb = breaker(&config);

        config.force_open = true;
        assert!(cb.try_acquire(&config).is_err());

        config.force_open = false;
        config.force_closed = true;
        for _ in 0..10 {
            run(&cb, &config, Outcome::Failure);
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire(&config).is_ok());
    }

    #[test]
    fn test_registry_is_lazy_and_shared() {
        let registry = CircuitBreakerRegistry::new();
        let config = config();
        let service = ServiceId::new("orders");
        assert!(registry.state(&service, &config).is_none());

        let a = registry.get(&service, &config);
        let b = registry.get(&service, &config);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.state(&service, &config), Some(CircuitState::Closed));
    }
}
