//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → store.rs (ArcSwap, snapshot per call)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Gateway::apply_config swaps the store and refreshes candidates
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CallbackPoolConfig, CircuitBreakerConfig, ClientConfig, HealthCheckConfig, LocalConfig, ObservabilityConfig,
    ServiceConfig, ThreadPoolConfig, TransportConfig,
};
pub use store::ConfigStore;
pub use validation::{validate_config, ValidationError};
pub use watcher::{ConfigWatcher, Reload};
