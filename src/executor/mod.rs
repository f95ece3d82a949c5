//! Callback execution subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway has a result for a subscriber:
//!     → pool.rs submit (queue, run on a callback thread)
//!
//! Every watchdog interval (watchdog.rs):
//!     → sample queue depth / pool size / active threads
//!     → grow or shrink the pool's core size
//! ```
//!
//! # Design Decisions
//! - Slow consumers block callback threads, never runtime workers
//! - Growth is driven by the watchdog, not by bursts of submissions

pub mod pool;
pub mod watchdog;

pub use pool::{AdaptiveCallbackPool, PoolError, PoolStats};
pub use watchdog::{evaluate, Adjustment, PoolWatchdog, WatchdogHandle};
