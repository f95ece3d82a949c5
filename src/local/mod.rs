//! In-process fast path.
//!
//! # Data Flow
//! ```text
//! Gateway routing decision:
//!     → adapter.rs can_handle (registry.rs lookup + [local] policy)
//!     → adapter.rs execute (Request → http::Request → Router::oneshot)
//!     → Response, or LocalError::NotSupported → network path
//! ```

pub mod adapter;
pub mod registry;

pub use adapter::LocalAdapter;
pub use registry::LocalHandlerRegistry;
