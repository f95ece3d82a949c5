//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (thread-pool overrides reference declared pools)
//! - Validate value ranges (percentages, window buckets, pool bounds)
//! - Detect conflicting overrides
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{CircuitBreakerConfig, ClientConfig, ServiceConfig};
use crate::load_balancer::ServerCandidate;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("service '{service}': invalid candidate '{candidate}': {reason}")]
    InvalidCandidate {
        service: String,
        candidate: String,
        reason: String,
    },

    #[error("service '{service}': {field} = {value} is out of range ({expected})")]
    OutOfRange {
        service: String,
        field: &'static str,
        value: u64,
        expected: &'static str,
    },

    #[error("service '{service}': rolling window of {window_ms}ms cannot be split into {buckets} buckets")]
    UnevenWindow { service: String, window_ms: u64, buckets: u32 },

    #[error("service '{0}': force_open and force_closed are both set")]
    ConflictingOverrides(String),

    #[error("service '{service}': thread pool '{pool}' is not declared")]
    UnknownThreadPool { service: String, pool: String },

    #[error("thread pool '{0}': max_concurrent must be greater than zero")]
    EmptyThreadPool(String),

    #[error("callback pool: {0}")]
    CallbackPool(String),
}

/// Check a whole configuration, collecting every problem.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_service("defaults", &config.defaults, config, &mut errors);
    for (name, service) in &config.services {
        validate_service(name, service, config, &mut errors);
    }

    for (name, pool) in &config.thread_pools {
        if pool.max_concurrent == 0 {
            errors.push(ValidationError::EmptyThreadPool(name.clone()));
        }
    }

    let pool = &config.callback_pool;
    if pool.core_size == 0 {
        errors.push(ValidationError::CallbackPool("core_size must be greater than zero".to_string()));
    }
    if pool.core_size > pool.max_size {
        errors.push(ValidationError::CallbackPool(format!(
            "core_size {} exceeds max_size {}",
            pool.core_size, pool.max_size
        )));
    }
    if pool.watchdog_interval_ms == 0 {
        errors.push(ValidationError::CallbackPool(
            "watchdog_interval_ms must be greater than zero".to_string(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_service(name: &str, service: &ServiceConfig, config: &ClientConfig, errors: &mut Vec<ValidationError>) {
    for candidate in &service.candidates {
        if let Err(e) = ServerCandidate::parse(candidate, service.protocol) {
            errors.push(ValidationError::InvalidCandidate {
                service: name.to_string(),
                candidate: candidate.clone(),
                reason: e.to_string(),
            });
        }
    }

    if service.max_concurrent_requests == 0 {
        errors.push(ValidationError::OutOfRange {
            service: name.to_string(),
            field: "max_concurrent_requests",
            value: 0,
            expected: ">= 1",
        });
    }

    if let Some(pool) = &service.isolation_thread_pool_override {
        if !config.thread_pools.contains_key(pool) {
            errors.push(ValidationError::UnknownThreadPool {
                service: name.to_string(),
                pool: pool.clone(),
            });
        }
    }

    validate_breaker(name, &service.circuit_breaker, errors);
}

fn validate_breaker(name: &str, breaker: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if breaker.error_threshold_percentage > 100 {
        errors.push(ValidationError::OutOfRange {
            service: name.to_string(),
            field: "error_threshold_percentage",
            value: u64::from(breaker.error_threshold_percentage),
            expected: "0..=100",
        });
    }
    if breaker.rolling_window_buckets == 0 {
        errors.push(ValidationError::OutOfRange {
            service: name.to_string(),
            field: "rolling_window_buckets",
            value: 0,
            expected: ">= 1",
        });
    } else if breaker.rolling_window_ms == 0 || breaker.rolling_window_ms % u64::from(breaker.rolling_window_buckets) != 0 {
        errors.push(ValidationError::UnevenWindow {
            service: name.to_string(),
            window_ms: breaker.rolling_window_ms,
            buckets: breaker.rolling_window_buckets,
        });
    }
    if breaker.force_open && breaker.force_closed {
        errors.push(ValidationError::ConflictingOverrides(name.to_string()));
    }
}
