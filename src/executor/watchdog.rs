//! Pool watchdog.
//!
//! Samples the callback pool on an interval and moves its core size:
//!
//! ```text
//! queue > 0, every thread busy, pool < max    → core = min(pool + queue, max)
//! queue empty, some thread idle, pool > base  → core = max(core - 1, base)
//! otherwise                                   → hold
//! ```
//!
//! Failed adjustments are logged and the loop carries on.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::CallbackPoolConfig;
use crate::executor::pool::{AdaptiveCallbackPool, PoolStats};
use crate::observability::metrics;

/// Decision for one watchdog cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Grow(usize),
    Shrink(usize),
    Hold,
}

/// Pure tuning rule.
pub fn evaluate(stats: &PoolStats, baseline: usize, max: usize) -> Adjustment {
    if stats.queue_depth > 0 && stats.active >= stats.pool_size && stats.pool_size < max {
        let target = (stats.pool_size + stats.queue_depth).min(max);
        if target > stats.core_size {
            return Adjustment::Grow(target);
        }
        return Adjustment::Hold;
    }

    if stats.queue_depth == 0 && stats.active < stats.pool_size && stats.pool_size > baseline {
        let target = stats.core_size.saturating_sub(1).max(baseline);
        if target < stats.core_size {
            return Adjustment::Shrink(target);
        }
    }
    Adjustment::Hold
}

pub struct PoolWatchdog {
    pool: Arc<AdaptiveCallbackPool>,
    baseline: usize,
    interval: Duration,
    initial_delay: Duration,
}

impl PoolWatchdog {
    pub fn new(pool: Arc<AdaptiveCallbackPool>, config: &CallbackPoolConfig) -> Self {
        Self {
            pool,
            baseline: config.core_size.max(1),
            interval: config.watchdog_interval().max(Duration::from_millis(1)),
            initial_delay: config.watchdog_initial_delay(),
        }
    }

    /// Run one cycle and apply its decision.
    pub fn tick(&self) -> Adjustment {
        let stats = self.pool.stats();
        let adjustment = evaluate(&stats, self.baseline, self.pool.max_size());

        let target = match adjustment {
            Adjustment::Grow(target) | Adjustment::Shrink(target) => target,
            Adjustment::Hold => {
                metrics::record_pool_tuning(stats.core_size, stats.queue_depth);
                return adjustment;
            }
        };

        match self.pool.set_core_size(target) {
            Ok(previous) => {
                tracing::info!(
                    previous,
                    core_size = target,
                    pool_size = stats.pool_size,
                    active = stats.active,
                    queue_depth = stats.queue_depth,
                    "Callback pool resized"
                );
                metrics::record_pool_tuning(target, stats.queue_depth);
            }
            Err(e) => {
                tracing::error!(error = %e, core_size = stats.core_size, "Callback pool resize failed");
                metrics::record_pool_tuning(stats.core_size, stats.queue_depth);
            }
        }
        adjustment
    }

    /// Run on a dedicated thread: first cycle after the initial delay, then
    /// one per interval. Dropping the returned handle stops the thread.
    pub fn spawn(self) -> io::Result<WatchdogHandle> {
        let (stop, stopped) = mpsc::channel::<()>();
        thread::Builder::new()
            .name("fleet-pool-watchdog".to_string())
            .spawn(move || {
                tracing::info!(
                    interval_ms = self.interval.as_millis() as u64,
                    baseline = self.baseline,
                    "Callback pool watchdog starting"
                );
                let mut wait = self.initial_delay;
                loop {
                    match stopped.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            self.tick();
                            wait = self.interval;
                        }
                        _ => break,
                    }
                }
                tracing::info!("Callback pool watchdog stopped");
            })?;
        Ok(WatchdogHandle { _stop: stop })
    }
}

/// Keeps the watchdog thread alive; dropping it ends the loop.
#[derive(Debug)]
pub struct WatchdogHandle {
    _stop: mpsc::Sender<()>,
}
