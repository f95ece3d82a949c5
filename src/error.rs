//! Error taxonomy.
//!
//! Callers only ever see [`ClientError`]. The lower layers report their own
//! types ([`TransportError`], [`LocalError`], [`ExecutionError`]) and the
//! gateway is the single place that maps them.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::http::{CorrelationId, Response, ServiceId};

/// Result alias for gateway calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Failure reported by a transport executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, reset, or could not be established in time.
    #[error("connection failed: {0}")]
    Connect(String),

    /// No response within the attempt deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Request could not be encoded or the response could not be read.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The caller went away.
    #[error("cancelled")]
    Cancelled,
}

impl TransportError {
    /// Connection errors and timeouts are eligible for retry.
    pub fn is_retriable(&self) -> bool {
        matches!(self, TransportError::Connect(_) | TransportError::Timeout(_))
    }
}

/// Failure reported by the in-process adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocalError {
    /// The request cannot be represented in-process; use the network path instead.
    #[error("not supported locally: {0}")]
    NotSupported(String),

    /// The local handler itself failed.
    #[error("local handler failed: {0}")]
    Handler(String),
}

/// Outcome of one protected execution (breaker + retry), before mapping.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("transport failure against {server}: {error}")]
    Transport { server: String, error: TransportError },

    /// A response whose status is treated as an error (body already buffered).
    #[error("error status {}", .0.status())]
    Status(Response),

    #[error("circuit open")]
    CircuitOpen,

    #[error("no candidates")]
    NoCandidates,

    /// Bulkhead or pool saturation.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Local(LocalError),

    #[error("cancelled")]
    Cancelled,

    /// Unexpected failure inside the client itself (e.g. a panicked task).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecutionError {
    /// Whether the retry executor may try again.
    pub fn is_retriable(&self) -> bool {
        match self {
            ExecutionError::Transport { error, .. } => error.is_retriable(),
            ExecutionError::Status(response) => response.status().is_server_error(),
            _ => false,
        }
    }
}

/// Why a request produced no usable response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FailureCause {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("cancelled")]
    Cancelled,

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("local execution failed: {0}")]
    Local(String),
}

impl From<TransportError> for FailureCause {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Connect(msg) => FailureCause::Connect(msg),
            TransportError::Timeout(after) => FailureCause::Timeout(after),
            TransportError::Protocol(msg) => FailureCause::Protocol(msg),
            TransportError::Cancelled => FailureCause::Cancelled,
        }
    }
}

/// The public error taxonomy.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// No response was obtained.
    #[error("request {correlation_id} to {} failed: {cause}", target(.service))]
    RequestFailed {
        service: Option<ServiceId>,
        correlation_id: CorrelationId,
        cause: FailureCause,
    },

    /// A response was obtained but its status is treated as an error.
    #[error("illegal response {status} for {method} {path} ({})", target(.service))]
    IllegalResponse {
        status: StatusCode,
        body: Bytes,
        service: Option<ServiceId>,
        method: Method,
        path: String,
        correlation_id: CorrelationId,
    },

    /// Rejected without attempting the network.
    #[error("circuit open for service {service}")]
    CircuitOpen { service: ServiceId },

    /// No candidates resolvable for the service.
    #[error("no candidates configured for service {service}")]
    ConfigurationMissing { service: ServiceId },
}

impl ClientError {
    /// Status code, for `IllegalResponse`.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::IllegalResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Failure cause, for `RequestFailed`.
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            ClientError::RequestFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// True if another call later might succeed (connection issues, 5xx, open circuit).
    pub fn is_retriable(&self) -> bool {
        match self {
            ClientError::RequestFailed { cause, .. } => {
                matches!(cause, FailureCause::Connect(_) | FailureCause::Timeout(_) | FailureCause::Rejected(_))
            }
            ClientError::IllegalResponse { status, .. } => status.is_server_error(),
            ClientError::CircuitOpen { .. } => true,
            ClientError::ConfigurationMissing { .. } => false,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ClientError::CircuitOpen { .. })
    }
}

fn target(service: &Option<ServiceId>) -> &str {
    service.as_ref().map(|s| s.as_str()).unwrap_or("absolute url")
}
