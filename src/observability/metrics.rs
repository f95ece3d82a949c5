//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define client metrics (requests, latency, attempts, circuit state, pool tuning)
//! - Expose a Prometheus-compatible metrics endpoint
//! - Drive the pluggable [`MetricsSink`] for every gateway call
//!
//! # Metrics
//! - `fleet_requests_total` (counter): calls by service, route, outcome
//! - `fleet_request_duration_seconds` (histogram): call latency by service, route
//! - `fleet_attempts_total` (counter): transport attempts by service, result
//! - `fleet_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `fleet_circuit_short_circuited_total` (counter): calls rejected by an open circuit
//! - `fleet_callback_pool_core_size` / `fleet_callback_pool_queue_depth` (gauges)
//! - `fleet_callback_pool_rejected_total` (counter)
//! - `fleet_candidate_health` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Label values are owned strings; service ids are low-cardinality

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::http::Response;
use crate::resilience::CircuitState;

pub const REQUESTS_TOTAL: &str = "fleet_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "fleet_request_duration_seconds";
pub const ATTEMPTS_TOTAL: &str = "fleet_attempts_total";
pub const CIRCUIT_STATE: &str = "fleet_circuit_state";
pub const CIRCUIT_SHORT_CIRCUITED_TOTAL: &str = "fleet_circuit_short_circuited_total";
pub const CALLBACK_POOL_CORE_SIZE: &str = "fleet_callback_pool_core_size";
pub const CALLBACK_POOL_QUEUE_DEPTH: &str = "fleet_callback_pool_queue_depth";
pub const CALLBACK_POOL_REJECTED_TOTAL: &str = "fleet_callback_pool_rejected_total";
pub const CANDIDATE_HEALTH: &str = "fleet_candidate_health";

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_attempt(service: &str, result: &'static str) {
    metrics::counter!(ATTEMPTS_TOTAL, "service" => service.to_string(), "result" => result).increment(1);
}

pub fn record_circuit_state(service: &str, state: CircuitState) {
    metrics::gauge!(CIRCUIT_STATE, "service" => service.to_string()).set(state.as_gauge());
}

pub fn record_short_circuit(service: &str) {
    metrics::counter!(CIRCUIT_SHORT_CIRCUITED_TOTAL, "service" => service.to_string()).increment(1);
}

pub fn record_pool_tuning(core_size: usize, queue_depth: usize) {
    metrics::gauge!(CALLBACK_POOL_CORE_SIZE).set(core_size as f64);
    metrics::gauge!(CALLBACK_POOL_QUEUE_DEPTH).set(queue_depth as f64);
}

pub fn record_pool_rejected() {
    metrics::counter!(CALLBACK_POOL_REJECTED_TOTAL).increment(1);
}

pub fn record_candidate_health(candidate: &str, healthy: bool) {
    let value = if healthy { 1.0 } else { 0.0 };
    metrics::gauge!(CANDIDATE_HEALTH, "candidate" => candidate.to_string()).set(value);
}

/// Which path served a gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Absolute,
    Local,
    Balanced,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Absolute => "absolute",
            Route::Local => "local",
            Route::Balanced => "balanced",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a gateway call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Fallback,
    Error,
    Cancelled,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::Fallback => "fallback",
            CallOutcome::Error => "error",
            CallOutcome::Cancelled => "cancelled",
        }
    }
}

/// Identifies a call to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Service id, or "absolute" for fully qualified URLs.
    pub service: String,
    pub route: Route,
}

/// Receives timing events for every gateway call.
pub trait MetricsSink: Send + Sync + fmt::Debug {
    fn on_start(&self, call: &CallContext);
    fn on_emit(&self, call: &CallContext, response: &Response);
    fn on_terminate(&self, call: &CallContext, outcome: CallOutcome, elapsed: Duration);
}

/// Forwards call events to the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderSink;

impl MetricsSink for RecorderSink {
    fn on_start(&self, _call: &CallContext) {}

    fn on_emit(&self, call: &CallContext, response: &Response) {
        tracing::trace!(service = %call.service, route = %call.route, status = %response.status(), "Response emitted");
    }

    fn on_terminate(&self, call: &CallContext, outcome: CallOutcome, elapsed: Duration) {
        metrics::counter!(
            REQUESTS_TOTAL,
            "service" => call.service.clone(),
            "route" => call.route.as_str(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        metrics::histogram!(
            REQUEST_DURATION_SECONDS,
            "service" => call.service.clone(),
            "route" => call.route.as_str()
        )
        .record(elapsed.as_secs_f64());
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn on_start(&self, _call: &CallContext) {}
    fn on_emit(&self, _call: &CallContext, _response: &Response) {}
    fn on_terminate(&self, _call: &CallContext, _outcome: CallOutcome, _elapsed: Duration) {}
}

/// Times one call; reports termination exactly once, on drop if not finished.
#[derive(Debug)]
pub struct CallTimer {
    sink: Arc<dyn MetricsSink>,
    call: CallContext,
    started: Instant,
    finished: bool,
}

impl CallTimer {
    pub fn start(sink: Arc<dyn MetricsSink>, call: CallContext) -> Self {
        sink.on_start(&call);
        Self {
            sink,
            call,
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn context(&self) -> &CallContext {
        &self.call
    }

    /// The route may only be known after the routing decision.
    pub fn set_route(&mut self, route: Route) {
        self.call.route = route;
    }

    pub fn emit(&self, response: &Response) {
        self.sink.on_emit(&self.call, response);
    }

    pub fn finish(mut self, outcome: CallOutcome) {
        self.terminate(outcome);
    }

    fn terminate(&mut self, outcome: CallOutcome) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.sink.on_terminate(&self.call, outcome, self.started.elapsed());
    }
}

impl Drop for CallTimer {
    fn drop(&mut self) {
        self.terminate(CallOutcome::Cancelled);
    }
}
