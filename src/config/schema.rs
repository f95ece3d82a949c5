//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http::ServiceId;
use crate::load_balancer::Strategy;
use crate::load_balancer::backend::Scheme;

/// Root configuration for the transport client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Transport (socket) settings.
    pub transport: TransportConfig,

    /// Callback delivery pool settings.
    pub callback_pool: CallbackPoolConfig,

    /// In-process routing policy.
    pub local: LocalConfig,

    /// Settings applied to services without an entry and to absolute-URL requests.
    pub defaults: ServiceConfig,

    /// Per-service settings keyed by service identifier.
    pub services: BTreeMap<String, ServiceConfig>,

    /// Dedicated execution pools that services can opt into.
    pub thread_pools: BTreeMap<String, ThreadPoolConfig>,

    /// Active candidate probing.
    pub health_check: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ClientConfig {
    /// Settings for `service`, falling back to the defaults.
    pub fn service(&self, service: &ServiceId) -> &ServiceConfig {
        self.services.get(service.as_str()).unwrap_or(&self.defaults)
    }

    /// True if the service has its own entry.
    pub fn has_service(&self, service: &ServiceId) -> bool {
        self.services.contains_key(service.as_str())
    }
}

/// Transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Per-attempt request timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// Idle pooled connection timeout in seconds.
    pub pool_idle_timeout_secs: u64,

    /// Upper bound when an error response body has to be buffered.
    pub max_buffered_body_bytes: usize,
}

impl TransportConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 1_000,
            request_timeout_ms: 30_000,
            pool_idle_timeout_secs: 90,
            max_buffered_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Callback pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CallbackPoolConfig {
    /// Baseline core size; the watchdog never shrinks below it.
    pub core_size: usize,

    /// Hard upper bound on worker threads.
    pub max_size: usize,

    /// Idle time before a surplus worker exits, in milliseconds.
    pub keep_alive_ms: u64,

    /// Watchdog period in milliseconds.
    pub watchdog_interval_ms: u64,

    /// Delay before the first watchdog run in milliseconds.
    pub watchdog_initial_delay_ms: u64,

    /// Optional bound on queued callbacks (unbounded when absent).
    pub queue_capacity: Option<usize>,
}

impl CallbackPoolConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn watchdog_initial_delay(&self) -> Duration {
        Duration::from_millis(self.watchdog_initial_delay_ms)
    }
}

impl Default for CallbackPoolConfig {
    fn default() -> Self {
        Self {
            core_size: 4,
            max_size: 1000,
            keep_alive_ms: 10_000,
            watchdog_interval_ms: 1_000,
            watchdog_initial_delay_ms: 5_000,
            queue_capacity: None,
        }
    }
}

/// In-process routing policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Allow routing to locally registered handlers.
    pub enabled: bool,

    /// Only route locally when every resolved candidate is co-located.
    pub require_colocated_candidates: bool,

    /// Hosts considered co-located with this process.
    pub colocated_hosts: Vec<String>,
}

impl LocalConfig {
    pub fn is_colocated(&self, host: &str) -> bool {
        self.colocated_hosts.iter().any(|h| h.eq_ignore_ascii_case(host))
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            require_colocated_candidates: false,
            colocated_hosts: vec![
                "localhost".to_string(),
                "127.0.0.1".to_string(),
                "::1".to_string(),
            ],
        }
    }
}

/// Per-service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Protocol used for candidates that don't carry their own scheme.
    pub protocol: Scheme,

    /// Candidate servers ("host:port" or "scheme://host:port").
    pub candidates: Vec<String>,

    /// Selection strategy.
    pub load_balancer: Strategy,

    /// Retries against the same server after a retriable failure.
    pub max_same_server_retries: u32,

    /// Retries moving to a different server.
    pub max_next_server_retries: u32,

    /// Base delay between attempts in milliseconds (0 = retry immediately).
    pub retry_backoff_base_ms: u64,

    /// Maximum delay between attempts in milliseconds.
    pub retry_backoff_max_ms: u64,

    /// Per-attempt timeout override in milliseconds.
    pub request_timeout_ms: Option<u64>,

    /// Treat 5xx responses as (retriable) errors.
    pub treat_5xx_as_error: bool,

    /// Run calls on the named dedicated pool (thread isolation).
    pub isolation_thread_pool_override: Option<String>,

    /// Concurrent calls allowed under semaphore isolation.
    pub max_concurrent_requests: usize,

    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,
}

impl ServiceConfig {
    /// Per-attempt timeout, using the transport default when not overridden.
    pub fn request_timeout(&self, transport: &TransportConfig) -> Duration {
        self.request_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| transport.request_timeout())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            protocol: Scheme::Http,
            candidates: Vec::new(),
            load_balancer: Strategy::RoundRobin,
            max_same_server_retries: 0,
            max_next_server_retries: 0,
            retry_backoff_base_ms: 0,
            retry_backoff_max_ms: 1_000,
            request_timeout_ms: None,
            treat_5xx_as_error: true,
            isolation_thread_pool_override: None,
            max_concurrent_requests: 100,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Disable to pass every call through without tracking.
    pub enabled: bool,

    /// Minimum calls in the rolling window before the error rate is evaluated.
    pub request_volume_threshold: u32,

    /// Error percentage (0-100) at which the circuit opens.
    pub error_threshold_percentage: u32,

    /// Time the circuit stays open before a trial call, in milliseconds.
    pub sleep_window_ms: u64,

    /// Rolling window length in milliseconds.
    pub rolling_window_ms: u64,

    /// Number of buckets the rolling window is split into.
    pub rolling_window_buckets: u32,

    /// Pin the circuit open.
    pub force_open: bool,

    /// Pin the circuit closed.
    pub force_closed: bool,
}

impl CircuitBreakerConfig {
    pub fn sleep_window(&self) -> Duration {
        Duration::from_millis(self.sleep_window_ms)
    }

    pub fn rolling_window(&self) -> Duration {
        Duration::from_millis(self.rolling_window_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request_volume_threshold: 20,
            error_threshold_percentage: 50,
            sleep_window_ms: 5_000,
            rolling_window_ms: 10_000,
            rolling_window_buckets: 10,
            force_open: false,
            force_closed: false,
        }
    }
}

/// Dedicated execution pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThreadPoolConfig {
    /// Concurrent calls the pool runs.
    pub max_concurrent: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self { max_concurrent: 10 }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe for HTTP health checks.
    pub path: String,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 10,
            timeout_secs: 5,
            path: "/health".to_string(),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
