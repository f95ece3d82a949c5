//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Gateway built (owns the pool watchdog) → spawn health monitor, config reload loop
//!
//! Shutdown (shutdown.rs):
//!     trigger() → every background loop exits → callback pool drains
//! ```
//!
//! # Design Decisions
//! - Background tasks share one broadcast shutdown signal
//! - Shutdown is cooperative; each loop checks the signal between ticks

pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start_background, Background};
