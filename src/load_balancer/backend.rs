//! Server candidate abstraction.
//!
//! # Responsibilities
//! - Represent a single concrete server for a service (host, port, scheme)
//! - Track in-flight requests (for Least Connections selection)
//! - Track passive health state (Healthy/Unhealthy) with hysteresis

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scheme used to reach a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// Error parsing a candidate address.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CandidateParseError {
    #[error("missing port in candidate '{0}'")]
    MissingPort(String),

    #[error("invalid port in candidate '{0}'")]
    InvalidPort(String),

    #[error("empty host in candidate '{0}'")]
    EmptyHost(String),

    #[error("invalid candidate URL '{0}': {1}")]
    InvalidUrl(String, String),
}

/// A single server eligible to serve a service.
#[derive(Debug)]
pub struct ServerCandidate {
    host: String,
    port: u16,
    scheme: Scheme,

    /// Number of requests currently in flight.
    active_requests: AtomicUsize,
    /// Current health state (0=Unknown, 1=Healthy, 2=Unhealthy).
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
}

impl ServerCandidate {
    /// Create a candidate. Port 443 always derives `https`.
    pub fn new(host: impl Into<String>, port: u16, protocol: Scheme) -> Self {
        let scheme = if port == 443 { Scheme::Https } else { protocol };
        Self {
            host: host.into(),
            port,
            scheme,
            active_requests: AtomicUsize::new(0),
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
        }
    }

    /// Parse `host:port`, `[v6]:port` or `scheme://host:port`.
    pub fn parse(raw: &str, protocol: Scheme) -> Result<Self, CandidateParseError> {
        let raw = raw.trim();
        if raw.contains("://") {
            let url = url::Url::parse(raw)
                .map_err(|e| CandidateParseError::InvalidUrl(raw.to_string(), e.to_string()))?;
            let scheme = match url.scheme() {
                "http" => Scheme::Http,
                "https" => Scheme::Https,
                other => {
                    return Err(CandidateParseError::InvalidUrl(
                        raw.to_string(),
                        format!("unsupported scheme '{}'", other),
                    ))
                }
            };
            let host = url
                .host_str()
                .filter(|h| !h.is_empty())
                .ok_or_else(|| CandidateParseError::EmptyHost(raw.to_string()))?
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_string();
            let port = url
                .port_or_known_default()
                .ok_or_else(|| CandidateParseError::MissingPort(raw.to_string()))?;
            return Ok(Self::new(host, port, scheme));
        }

        let (host, port) = raw
            .rsplit_once(':')
            .ok_or_else(|| CandidateParseError::MissingPort(raw.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(CandidateParseError::EmptyHost(raw.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| CandidateParseError::InvalidPort(raw.to_string()))?;
        Ok(Self::new(host, port, protocol))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// `host:port`, with IPv6 hosts bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// `scheme://host:port`.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.authority())
    }

    /// Same server identity (host, port, scheme).
    pub fn same_address(&self, other: &ServerCandidate) -> bool {
        self.port == other.port && self.scheme == other.scheme && self.host.eq_ignore_ascii_case(&other.host)
    }

    /// Get the current number of in-flight requests.
    pub fn active_requests(&self) -> usize {
        self.active_requests.load(Ordering::Relaxed)
    }

    /// Track an in-flight request until the returned guard is dropped.
    pub fn track(self: &Arc<Self>) -> CandidateGuard {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        CandidateGuard {
            candidate: self.clone(),
        }
    }

    // --- Health Logic ---

    pub fn health(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Return true if the candidate is considered healthy (Healthy or Unknown).
    pub fn is_healthy(&self) -> bool {
        self.health() != HealthState::Unhealthy
    }

    /// Report a successful request/check. Returns true on a transition to Healthy.
    pub fn mark_success(&self, healthy_threshold: usize) -> bool {
        self.consecutive_failures.store(0, Ordering::Relaxed);

        if self.health() == HealthState::Healthy {
            return false;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= healthy_threshold.max(1) {
            self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
            self.consecutive_successes.store(0, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// Report a failed request/check. Returns true on a transition to Unhealthy.
    pub fn mark_failure(&self, unhealthy_threshold: usize) -> bool {
        self.consecutive_successes.store(0, Ordering::Relaxed);

        if self.health() == HealthState::Unhealthy {
            return false;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= unhealthy_threshold.max(1) {
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
            return true;
        }
        false
    }
}

impl fmt::Display for ServerCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

/// A RAII guard that manages the in-flight request count.
#[derive(Debug)]
pub struct CandidateGuard {
    candidate: Arc<ServerCandidate>,
}

impl CandidateGuard {
    pub fn candidate(&self) -> &Arc<ServerCandidate> {
        &self.candidate
    }
}

impl Deref for CandidateGuard {
    type Target = ServerCandidate;
    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl Drop for CandidateGuard {
    fn drop(&mut self) {
        self.candidate.active_requests.fetch_sub(1, Ordering::Relaxed);
    }
}
