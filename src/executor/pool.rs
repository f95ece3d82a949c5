//! Adaptive callback pool.
//!
//! # Responsibilities
//! - Run result callbacks on dedicated OS threads, off the runtime workers
//! - Queue work (FIFO) once core threads are busy instead of spawning more
//! - Let the watchdog move the core size at runtime
//!
//! # Design Decisions
//! - Queueing discipline: the pool only grows past core when a bounded queue
//!   is full; with the default unbounded queue growth is watchdog-driven
//! - Threads above core exit after `keep_alive` idle
//! - Saturation drops the task with a logged error; submitters never panic
//! - A panicking callback is contained to that callback

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::config::CallbackPoolConfig;
use crate::observability::metrics;
use crate::util::lock_unpoisoned;

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("callback rejected: {0}")]
    Rejected(&'static str),

    #[error("core size {requested} outside 1..={max}")]
    InvalidCoreSize { requested: usize, max: usize },
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub core_size: usize,
    pub max_size: usize,
    pub pool_size: usize,
    pub active: usize,
    pub queue_depth: usize,
    pub completed: u64,
    pub rejected: u64,
}

struct QueueState {
    tasks: VecDeque<Task>,
    pool_size: usize,
    shutdown: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
    core_size: AtomicUsize,
    active: AtomicUsize,
    completed: AtomicU64,
    rejected: AtomicU64,
    next_worker: AtomicUsize,
    max_size: usize,
    keep_alive: Duration,
    queue_capacity: Option<usize>,
}

/// Thread pool for callbacks whose core size is tuned at runtime.
pub struct AdaptiveCallbackPool {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AdaptiveCallbackPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveCallbackPool").field("stats", &self.stats()).finish()
    }
}

impl AdaptiveCallbackPool {
    pub fn new(config: &CallbackPoolConfig) -> Self {
        let max_size = config.max_size.max(1);
        let core_size = config.core_size.clamp(1, max_size);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    tasks: VecDeque::new(),
                    pool_size: 0,
                    shutdown: false,
                }),
                available: Condvar::new(),
                core_size: AtomicUsize::new(core_size),
                active: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                next_worker: AtomicUsize::new(0),
                max_size,
                keep_alive: config.keep_alive(),
                queue_capacity: config.queue_capacity,
            }),
        }
    }

    /// Queue a callback. On rejection the task is dropped and the error logged.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let task: Task = Box::new(task);
        let mut state = lock_unpoisoned(&self.shared.state);
        if state.shutdown {
            drop(state);
            return Err(self.reject("pool is shut down"));
        }

        if state.pool_size < self.shared.core_size.load(Ordering::Acquire) {
            state.pool_size += 1;
            drop(state);
            return self.spawn_worker(Some(task));
        }

        let has_room = self
            .shared
            .queue_capacity
            .map(|capacity| state.tasks.len() < capacity)
            .unwrap_or(true);
        if has_room {
            state.tasks.push_back(task);
            drop(state);
            self.shared.available.notify_one();
            return Ok(());
        }

        if state.pool_size < self.shared.max_size {
            state.pool_size += 1;
            drop(state);
            return self.spawn_worker(Some(task));
        }

        drop(state);
        Err(self.reject("queue and threads exhausted"))
    }

    /// Move the core size. Returns the previous value.
    pub fn set_core_size(&self, core_size: usize) -> Result<usize, PoolError> {
        if core_size == 0 || core_size > self.shared.max_size {
            return Err(PoolError::InvalidCoreSize {
                requested: core_size,
                max: self.shared.max_size,
            });
        }

        let previous = self.shared.core_size.swap(core_size, Ordering::AcqRel);
        if core_size > previous {
            // Start threads for work that is already waiting
            let to_start = {
                let mut state = lock_unpoisoned(&self.shared.state);
                let wanted = core_size
                    .saturating_sub(state.pool_size)
                    .min(state.tasks.len());
                state.pool_size += wanted;
                wanted
            };
            for _ in 0..to_start {
                if let Err(e) = self.spawn_worker(None) {
                    tracing::error!(error = %e, "Failed to start callback worker");
                }
            }
        } else {
            // Idle threads above the new core re-check and start timing out
            self.shared.available.notify_all();
        }
        Ok(previous)
    }

    pub fn core_size(&self) -> usize {
        self.shared.core_size.load(Ordering::Acquire)
    }

    pub fn max_size(&self) -> usize {
        self.shared.max_size
    }

    pub fn stats(&self) -> PoolStats {
        let (pool_size, queue_depth) = {
            let state = lock_unpoisoned(&self.shared.state);
            (state.pool_size, state.tasks.len())
        };
        PoolStats {
            core_size: self.core_size(),
            max_size: self.shared.max_size,
            pool_size,
            active: self.shared.active.load(Ordering::Acquire),
            queue_depth,
            completed: self.shared.completed.load(Ordering::Relaxed),
            rejected: self.shared.rejected.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting work; queued callbacks still run, then threads exit.
    pub fn shutdown(&self) {
        let mut state = lock_unpoisoned(&self.shared.state);
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        drop(state);
        self.shared.available.notify_all();
        tracing::debug!("Callback pool shutting down");
    }

    fn reject(&self, reason: &'static str) -> PoolError {
        self.shared.rejected.fetch_add(1, Ordering::Relaxed);
        metrics::record_pool_rejected();
        tracing::error!(reason, "Callback dropped");
        PoolError::Rejected(reason)
    }

    /// `pool_size` must already account for the new thread.
    fn spawn_worker(&self, first: Option<Task>) -> Result<(), PoolError> {
        let shared = self.shared.clone();
        let id = self.shared.next_worker.fetch_add(1, Ordering::Relaxed);
        let spawned = thread::Builder::new()
            .name(format!("fleet-callback-{}", id))
            .spawn(move || worker_loop(shared, first));

        match spawned {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "Failed to spawn callback thread");
                lock_unpoisoned(&self.shared.state).pool_size -= 1;
                Err(self.reject("thread spawn failed"))
            }
        }
    }
}

impl Drop for AdaptiveCallbackPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<Shared>, first: Option<Task>) {
    let mut next = first;
    loop {
        if let Some(task) = next.take() {
            shared.active.fetch_add(1, Ordering::AcqRel);
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                tracing::error!("Callback panicked");
            }
            shared.active.fetch_sub(1, Ordering::AcqRel);
            shared.completed.fetch_add(1, Ordering::Relaxed);
        }

        let mut state = lock_unpoisoned(&shared.state);
        loop {
            if let Some(task) = state.tasks.pop_front() {
                next = Some(task);
                break;
            }
            if state.shutdown {
                state.pool_size -= 1;
                return;
            }
            if state.pool_size > shared.core_size.load(Ordering::Acquire) {
                let (guard, wait) = match shared.available.wait_timeout(state, shared.keep_alive) {
                    Ok(result) => result,
                    Err(poisoned) => poisoned.into_inner(),
                };
                state = guard;
                if wait.timed_out()
                    && state.tasks.is_empty()
                    && state.pool_size > shared.core_size.load(Ordering::Acquire)
                {
                    state.pool_size -= 1;
                    return;
                }
            } else {
                state = match shared.available.wait(state) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
        }
    }
}
