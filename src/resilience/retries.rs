//! Load-balanced retry executor.
//!
//! # Responsibilities
//! - Pick a candidate for each attempt (re-resolved every time, membership may change)
//! - Issue the attempt through the transport under a deadline
//! - Classify the outcome and spend the same-server / next-server budgets
//! - Feed passive health marks back into the candidates
//!
//! # Design Decisions
//! - Budgets come fresh from configuration for every logical call
//! - Moving to the next server resets the same-server budget
//! - Non-retriable failures (4xx, protocol errors) return immediately
//! - Cancellation is checked before every attempt and during backoff

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, ServiceConfig};
use crate::error::{ExecutionError, TransportError};
use crate::http::{Request, Response, ServiceId};
use crate::load_balancer::{Balancers, CandidateResolver, ServerCandidate};
use crate::net::TransportExecutor;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;
use crate::resilience::timeouts::{guarded, pause};

/// What to do after a retriable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    SameServer,
    NextServer,
    Exhausted,
}

/// Retry allowance for one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    same_server_max: u32,
    same_remaining: u32,
    next_remaining: u32,
}

impl RetryBudget {
    pub fn new(max_same_server: u32, max_next_server: u32) -> Self {
        Self {
            same_server_max: max_same_server,
            same_remaining: max_same_server,
            next_remaining: max_next_server,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.max_same_server_retries, config.max_next_server_retries)
    }

    pub fn same_remaining(&self) -> u32 {
        self.same_remaining
    }

    pub fn next_remaining(&self) -> u32 {
        self.next_remaining
    }

    /// Consume budget for one retriable failure.
    pub fn next_step(&mut self) -> RetryStep {
        if self.same_remaining > 0 {
            self.same_remaining -= 1;
            return RetryStep::SameServer;
        }
        if self.next_remaining > 0 {
            self.next_remaining -= 1;
            self.same_remaining = self.same_server_max;
            return RetryStep::NextServer;
        }
        RetryStep::Exhausted
    }
}

/// Issues calls for a service across its candidates with bounded retry.
#[derive(Debug)]
pub struct LoadBalancedExecutor {
    resolver: Arc<dyn CandidateResolver>,
    transport: Arc<dyn TransportExecutor>,
    balancers: Balancers,
}

impl LoadBalancedExecutor {
    pub fn new(resolver: Arc<dyn CandidateResolver>, transport: Arc<dyn TransportExecutor>) -> Self {
        Self {
            resolver,
            transport,
            balancers: Balancers::new(),
        }
    }

    pub fn resolver(&self) -> &Arc<dyn CandidateResolver> {
        &self.resolver
    }

    pub fn transport(&self) -> &Arc<dyn TransportExecutor> {
        &self.transport
    }

    /// Run `request` against `service`, retrying per the service's budgets.
    pub async fn execute(
        &self,
        service: &ServiceId,
        request: &Request,
        config: &ClientConfig,
        cancel: &CancellationToken,
    ) -> Result<Response, ExecutionError> {
        let budget = RetryBudget::from_config(config.service(service));
        self.execute_with(service, request, config, budget, cancel).await
    }

    /// Same as [`execute`](Self::execute) with an explicit budget.
    pub async fn execute_with(
        &self,
        service: &ServiceId,
        request: &Request,
        config: &ClientConfig,
        mut budget: RetryBudget,
        cancel: &CancellationToken,
    ) -> Result<Response, ExecutionError> {
        let service_config = config.service(service);
        let mut tried: Vec<Arc<ServerCandidate>> = Vec::new();
        let mut stay_on: Option<Arc<ServerCandidate>> = None;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ExecutionError::Cancelled);
            }

            let candidates = self.resolver.resolve(service);
            if candidates.is_empty() {
                return Err(ExecutionError::NoCandidates);
            }

            // Same-server retry only if the server is still a member
            let server = match stay_on
                .take()
                .and_then(|prev| candidates.iter().find(|c| c.same_address(&prev)).cloned())
            {
                Some(server) => server,
                None => self
                    .balancers
                    .select(service, service_config.load_balancer, &candidates, &tried)
                    .ok_or(ExecutionError::NoCandidates)?,
            };

            attempt += 1;
            tracing::debug!(
                service = %service,
                correlation_id = %request.correlation_id(),
                server = %server,
                attempt,
                "Issuing attempt"
            );

            let error = match self.attempt(&server, request, service_config, config, cancel).await {
                Ok(response) => {
                    server.mark_success(config.health_check.healthy_threshold as usize);
                    metrics::record_attempt(service.as_str(), "success");
                    return Ok(response);
                }
                Err(error) => error,
            };

            if matches!(error, ExecutionError::Cancelled) {
                metrics::record_attempt(service.as_str(), "cancelled");
                return Err(error);
            }
            if !error.is_retriable() {
                if matches!(error, ExecutionError::Status(_)) {
                    // The backend answered; it is alive
                    server.mark_success(config.health_check.healthy_threshold as usize);
                }
                metrics::record_attempt(service.as_str(), "fatal");
                return Err(error);
            }

            metrics::record_attempt(service.as_str(), "retriable");
            if server.mark_failure(config.health_check.unhealthy_threshold as usize) {
                tracing::warn!(service = %service, server = %server, "Candidate marked unhealthy");
                metrics::record_candidate_health(&server.to_string(), false);
            }

            match budget.next_step() {
                RetryStep::SameServer => {
                    tracing::debug!(
                        service = %service,
                        correlation_id = %request.correlation_id(),
                        server = %server,
                        attempt,
                        error = %error,
                        same_remaining = budget.same_remaining(),
                        "Retrying same server"
                    );
                    stay_on = Some(server);
                }
                RetryStep::NextServer => {
                    tracing::debug!(
                        service = %service,
                        correlation_id = %request.correlation_id(),
                        server = %server,
                        attempt,
                        error = %error,
                        next_remaining = budget.next_remaining(),
                        "Retrying next server"
                    );
                    tried.push(server);
                }
                RetryStep::Exhausted => {
                    tracing::debug!(
                        service = %service,
                        correlation_id = %request.correlation_id(),
                        attempts = attempt,
                        error = %error,
                        "Retry budget exhausted"
                    );
                    return Err(error);
                }
            }

            let delay = Backoff::for_service(service_config).delay(attempt);
            if !pause(delay, cancel).await {
                return Err(ExecutionError::Cancelled);
            }
        }
    }

    async fn attempt(
        &self,
        server: &Arc<ServerCandidate>,
        request: &Request,
        service_config: &ServiceConfig,
        config: &ClientConfig,
        cancel: &CancellationToken,
    ) -> Result<Response, ExecutionError> {
        let _in_flight = server.track();
        single_attempt(
            self.transport.as_ref(),
            server,
            request,
            service_config.request_timeout(&config.transport),
            service_config.treat_5xx_as_error,
            config.transport.max_buffered_body_bytes,
            cancel,
        )
        .await
    }
}

/// One attempt: send, then classify the status while still under the deadline.
pub(crate) async fn single_attempt(
    transport: &dyn TransportExecutor,
    server: &ServerCandidate,
    request: &Request,
    deadline: Duration,
    treat_5xx_as_error: bool,
    body_limit: usize,
    cancel: &CancellationToken,
) -> Result<Response, ExecutionError> {
    let result = guarded(deadline, cancel, async {
        let response = transport.send(server, request).await?;
        Ok(classify(response, treat_5xx_as_error, body_limit).await)
    })
    .await;

    match result {
        Ok(classified) => classified,
        Err(TransportError::Cancelled) => Err(ExecutionError::Cancelled),
        Err(error) => Err(ExecutionError::Transport {
            server: server.to_string(),
            error,
        }),
    }
}

/// Split a response into success or an error status (body buffered for the error).
pub(crate) async fn classify(
    response: Response,
    treat_5xx_as_error: bool,
    limit: usize,
) -> Result<Response, ExecutionError> {
    let status = response.status();
    let is_error = status.is_client_error() || (status.is_server_error() && treat_5xx_as_error);
    if !is_error {
        return Ok(response);
    }
    match response.buffer(limit).await {
        Ok(buffered) => Err(ExecutionError::Status(buffered)),
        Err(e) => {
            tracing::debug!(status = %status, error = %e, "Could not read error body");
            Err(ExecutionError::Status(Response::new(status)))
        }
    }
}
