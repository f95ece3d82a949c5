//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (retries, circuit transitions, pool tuning, fallbacks)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Gateway calls:
//!     → CallTimer → MetricsSink (start, emit, terminate)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Correlation ID flows through every log line of a call
//! - Metrics are cheap (atomic increments behind the facade)

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{init_metrics, CallContext, CallOutcome, CallTimer, MetricsSink, NoopSink, RecorderSink, Route};
