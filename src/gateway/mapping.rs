//! Error mapping and outcome classification.
//!
//! The only place where internal failures become [`ClientError`]s.

use crate::error::{ClientError, ExecutionError, FailureCause};
use crate::http::{Request, Response};
use crate::resilience::Outcome;

/// Map an execution failure to the public taxonomy.
pub fn to_client_error(error: ExecutionError, request: &Request) -> ClientError {
    let service = request.service().cloned();
    let correlation_id = request.correlation_id();
    let failed = |cause: FailureCause| ClientError::RequestFailed {
        service: service.clone(),
        correlation_id,
        cause,
    };

    match error {
        ExecutionError::Transport { error, .. } => failed(error.into()),
        ExecutionError::Status(response) => ClientError::IllegalResponse {
            status: response.status(),
            body: response.bytes().cloned().unwrap_or_default(),
            service: service.clone(),
            method: request.method().clone(),
            path: request.path().to_string(),
            correlation_id,
        },
        ExecutionError::CircuitOpen => match &service {
            Some(service) => ClientError::CircuitOpen {
                service: service.clone(),
            },
            None => failed(FailureCause::Rejected("circuit open".to_string())),
        },
        ExecutionError::NoCandidates => match &service {
            Some(service) => ClientError::ConfigurationMissing {
                service: service.clone(),
            },
            None => failed(FailureCause::Protocol("no server for request".to_string())),
        },
        ExecutionError::Rejected(reason) => failed(FailureCause::Rejected(reason)),
        ExecutionError::Local(error) => failed(FailureCause::Local(error.to_string())),
        ExecutionError::Cancelled => failed(FailureCause::Cancelled),
        ExecutionError::Internal(reason) => failed(FailureCause::Protocol(reason)),
    }
}

/// What a finished protected call contributes to the rolling window.
/// `None` means no verdict (the call never reached a backend).
pub fn outcome_of(result: &Result<Response, ExecutionError>) -> Option<Outcome> {
    match result {
        Ok(_) => Some(Outcome::Success),
        Err(ExecutionError::Status(response)) if response.status().is_client_error() => Some(Outcome::Success),
        Err(ExecutionError::Status(_)) => Some(Outcome::Failure),
        Err(ExecutionError::Transport { error, .. }) => match error {
            crate::error::TransportError::Timeout(_) => Some(Outcome::Timeout),
            _ => Some(Outcome::Failure),
        },
        Err(ExecutionError::Rejected(_)) => Some(Outcome::Rejected),
        Err(ExecutionError::Local(_)) | Err(ExecutionError::Internal(_)) => Some(Outcome::Failure),
        Err(ExecutionError::NoCandidates) | Err(ExecutionError::CircuitOpen) | Err(ExecutionError::Cancelled) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::http::{Method, StatusCode};

    use crate::error::{LocalError, TransportError};

    #[test]
    fn test_status_maps_to_illegal_response_with_context() {
        let request = Request::builder("orders").method(Method::POST).path("/items").build();
        let error = to_client_error(
            ExecutionError::Status(Response::buffered(StatusCode::CONFLICT, "dup")),
            &request,
        );
        match error {
            ClientError::IllegalResponse {
                status,
                body,
                method,
                path,
                correlation_id,
                ..
            } => {
                assert_eq!(status, StatusCode::CONFLICT);
                assert_eq!(body.as_ref(), b"dup");
                assert_eq!(method, Method::POST);
                assert_eq!(path, "/items");
                assert_eq!(correlation_id, request.correlation_id());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_taxonomy() {
        let request = Request::get("orders", "/");
        assert!(to_client_error(ExecutionError::CircuitOpen, &request).is_circuit_open());
        assert!(matches!(
            to_client_error(ExecutionError::NoCandidates, &request),
            ClientError::ConfigurationMissing { .. }
        ));
        let err = to_client_error(
            ExecutionError::Transport {
                server: "http://10.0.0.1:80".into(),
                error: TransportError::Timeout(Duration::from_secs(1)),
            },
            &request,
        );
        assert_eq!(err.cause(), Some(&FailureCause::Timeout(Duration::from_secs(1))));
        let err = to_client_error(ExecutionError::Local(LocalError::Handler("boom".into())), &request);
        assert!(matches!(err.cause(), Some(FailureCause::Local(_))));
    }

    #[test]
    fn test_outcomes() {
        assert_eq!(outcome_of(&Ok(Response::new(StatusCode::OK))), Some(Outcome::Success));
        assert_eq!(
            outcome_of(&Err(ExecutionError::Status(Response::new(StatusCode::NOT_FOUND)))),
            Some(Outcome::Success)
        );
        assert_eq!(
            outcome_of(&Err(ExecutionError::Status(Response::new(StatusCode::BAD_GATEWAY)))),
            Some(Outcome::Failure)
        );
        assert_eq!(
            outcome_of(&Err(ExecutionError::Transport {
                server: String::new(),
                error: TransportError::Timeout(Duration::from_secs(1)),
            })),
            Some(Outcome::Timeout)
        );
        assert_eq!(outcome_of(&Err(ExecutionError::NoCandidates)), None);
    }
}
