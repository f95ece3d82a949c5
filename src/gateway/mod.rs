//! Request gateway.
//!
//! # Data Flow
//! ```text
//! Gateway::execute(request, fallback?)
//!     → CallTimer start (MetricsSink)
//!     → route decision
//!         Absolute  → single transport attempt (no balancing, no breaker)
//!         Local     → breaker → bulkhead → LocalAdapter
//!                        NotSupported → one network attempt, breaker untouched
//!         Balanced  → breaker → bulkhead → LoadBalancedExecutor
//!     → mapping.rs (ExecutionError → ClientError)
//!     → fallback substitution, if supplied
//!     → CallTimer terminate
//! ```
//!
//! # Design Decisions
//! - Routing is a tagged dispatch on [`Route`]
//! - Semaphore isolation runs inside the caller's future; thread isolation
//!   spawns the call and hands the result back through the callback pool
//! - Each call works on one config snapshot, even if a reload lands mid-call
//! - The callback pool's watchdog lives exactly as long as the gateway

pub mod future;
pub mod mapping;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, ConfigStore, ValidationError};
use crate::error::{ClientResult, ExecutionError, LocalError, TransportError};
use crate::executor::{AdaptiveCallbackPool, PoolWatchdog, WatchdogHandle};
use crate::http::{Request, Response, ServiceId};
use crate::load_balancer::{CandidateResolver, Scheme, ServerCandidate, StaticResolver};
use crate::local::{LocalAdapter, LocalHandlerRegistry};
use crate::net::{HyperTransport, TransportExecutor};
use crate::observability::{CallContext, CallOutcome, CallTimer, MetricsSink, RecorderSink, Route};
use crate::resilience::retries::{classify, single_attempt};
use crate::resilience::{
    Bulkheads, CircuitBreakerRegistry, CircuitPermit, CircuitState, Isolation, LoadBalancedExecutor, Outcome,
    RetryBudget,
};

pub use future::{Fallback, ResponseFuture};

/// Entry point for service-to-service calls.
#[derive(Clone, Debug)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

#[derive(Debug)]
struct GatewayInner {
    store: Arc<ConfigStore>,
    static_resolver: Option<Arc<StaticResolver>>,
    resolver: Arc<dyn CandidateResolver>,
    transport: Arc<dyn TransportExecutor>,
    executor: LoadBalancedExecutor,
    local: Option<LocalAdapter>,
    breakers: CircuitBreakerRegistry,
    bulkheads: Bulkheads,
    callbacks: Arc<AdaptiveCallbackPool>,
    _watchdog: Option<WatchdogHandle>,
    sink: Arc<dyn MetricsSink>,
}

/// Builder for [`Gateway`].
pub struct GatewayBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn TransportExecutor>>,
    resolver: Option<Arc<dyn CandidateResolver>>,
    local_handlers: Option<Arc<LocalHandlerRegistry>>,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl GatewayBuilder {
    /// Replace the default hyper transport.
    pub fn transport(mut self, transport: Arc<dyn TransportExecutor>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use an external resolver instead of the config-driven one.
    /// Config reloads then no longer refresh candidates.
    pub fn resolver(mut self, resolver: Arc<dyn CandidateResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Enable the in-process path with these handlers.
    pub fn local_handlers(mut self, registry: Arc<LocalHandlerRegistry>) -> Self {
        self.local_handlers = Some(registry);
        self
    }

    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Gateway {
        let config = self.config;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HyperTransport::new(&config.transport)));

        let (static_resolver, resolver) = match self.resolver {
            Some(resolver) => (None, resolver),
            None => {
                let resolver = Arc::new(StaticResolver::from_config(&config));
                (Some(resolver.clone()), resolver as Arc<dyn CandidateResolver>)
            }
        };

        let callbacks = Arc::new(AdaptiveCallbackPool::new(&config.callback_pool));
        let watchdog = match PoolWatchdog::new(callbacks.clone(), &config.callback_pool).spawn() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "Failed to start callback pool watchdog");
                None
            }
        };
        let executor = LoadBalancedExecutor::new(resolver.clone(), transport.clone());

        tracing::info!(
            services = config.services.len(),
            local = self.local_handlers.is_some(),
            "Gateway ready"
        );

        Gateway {
            inner: Arc::new(GatewayInner {
                store: Arc::new(ConfigStore::new(config)),
                static_resolver,
                resolver,
                transport,
                executor,
                local: self.local_handlers.map(LocalAdapter::new),
                breakers: CircuitBreakerRegistry::new(),
                bulkheads: Bulkheads::new(),
                callbacks,
                _watchdog: watchdog,
                sink: self.sink.unwrap_or_else(|| Arc::new(RecorderSink)),
            }),
        }
    }
}

impl Gateway {
    pub fn builder(config: ClientConfig) -> GatewayBuilder {
        GatewayBuilder {
            config,
            transport: None,
            resolver: None,
            local_handlers: None,
            sink: None,
        }
    }

    /// Issue `request`. The call starts when the returned future is first polled.
    pub fn execute(&self, request: Request, fallback: Option<Fallback>) -> ResponseFuture {
        let cancel = CancellationToken::new();
        let initial_route = if request.service().is_some() {
            Route::Balanced
        } else {
            Route::Absolute
        };
        let timer = CallTimer::start(
            self.inner.sink.clone(),
            CallContext {
                service: label(&request),
                route: initial_route,
            },
        );

        let service = request.service().cloned();
        let correlation_id = request.correlation_id();
        let inner = self.inner.clone();
        let token = cancel.clone();
        let call = async move { inner.call(request, fallback, timer, token).await }.boxed();

        ResponseFuture::new(call, cancel, service, correlation_id)
    }

    /// Issue `request` on the runtime and deliver the result to `callback`
    /// on the callback pool. Must be called within a Tokio runtime.
    ///
    /// Cancelling the returned token suppresses delivery.
    pub fn submit<F>(&self, request: Request, fallback: Option<Fallback>, callback: F) -> CancellationToken
    where
        F: FnOnce(ClientResult<Response>) + Send + 'static,
    {
        let future = self.execute(request, fallback);
        let token = future.cancellation_token();
        let correlation_id = future.correlation_id();
        let callbacks = self.inner.callbacks.clone();
        let cancelled = token.clone();

        tokio::spawn(async move {
            let result = future.await;
            if cancelled.is_cancelled() {
                tracing::debug!(correlation_id = %correlation_id, "Call cancelled, result not delivered");
                return;
            }
            if let Err(e) = callbacks.submit(move || callback(result)) {
                tracing::error!(correlation_id = %correlation_id, error = %e, "Result dropped");
            }
        });
        token
    }

    /// True if a call to `service` has somewhere to go.
    pub fn has_valid_configuration(&self, service: &ServiceId) -> bool {
        let config = self.inner.store.snapshot();
        if let Some(local) = &self.inner.local {
            if local.can_handle(service, &config.local, self.inner.resolver.as_ref()) {
                return true;
            }
        }
        !self.inner.resolver.resolve(service).is_empty()
    }

    /// Validate and swap in a new configuration; candidate changes apply to
    /// the next attempt. An invalid config leaves the current one in place.
    pub fn apply_config(&self, config: ClientConfig) -> Result<(), Vec<ValidationError>> {
        crate::config::validate_config(&config)?;
        if let Some(resolver) = &self.inner.static_resolver {
            resolver.sync_from(&config);
        }
        tracing::info!(services = config.services.len(), "Configuration applied");
        self.inner.store.replace(config);
        Ok(())
    }

    pub fn config(&self) -> Arc<ClientConfig> {
        self.inner.store.snapshot()
    }

    pub(crate) fn config_store(&self) -> &Arc<ConfigStore> {
        &self.inner.store
    }

    /// Circuit state for `service`, if a call has created its breaker.
    pub fn circuit_state(&self, service: &ServiceId) -> Option<CircuitState> {
        let config = self.inner.store.snapshot();
        self.inner
            .breakers
            .state(service, &config.service(service).circuit_breaker)
    }

    pub fn candidates(&self, service: &ServiceId) -> Vec<Arc<ServerCandidate>> {
        self.inner.resolver.resolve(service)
    }

    pub fn callback_pool(&self) -> &Arc<AdaptiveCallbackPool> {
        &self.inner.callbacks
    }

    pub fn local_handlers(&self) -> Option<&Arc<LocalHandlerRegistry>> {
        self.inner.local.as_ref().map(|l| l.registry())
    }

    pub fn resolver(&self) -> &Arc<dyn CandidateResolver> {
        &self.inner.resolver
    }

    pub fn transport(&self) -> &Arc<dyn TransportExecutor> {
        &self.inner.transport
    }
}

impl GatewayInner {
    async fn call(
        self: Arc<Self>,
        request: Request,
        fallback: Option<Fallback>,
        mut timer: CallTimer,
        cancel: CancellationToken,
    ) -> ClientResult<Response> {
        let config = self.store.snapshot();
        let route = self.route(&request, &config);
        timer.set_route(route);

        let result = match (route, request.service().cloned()) {
            (Route::Absolute, _) | (_, None) => self.execute_absolute(&request, &config, &cancel).await,
            (route, Some(service)) => {
                self.clone()
                    .execute_protected(route, service, request.clone(), config, cancel.clone())
                    .await
            }
        };

        let error = match result {
            Ok(response) => {
                timer.emit(&response);
                timer.finish(CallOutcome::Success);
                return Ok(response);
            }
            Err(error) => error,
        };

        let cancelled = matches!(error, ExecutionError::Cancelled);
        let error = mapping::to_client_error(error, &request);
        match fallback {
            Some(fallback) if !cancelled => {
                tracing::warn!(
                    service = %timer.context().service,
                    correlation_id = %request.correlation_id(),
                    error = %error,
                    "Call failed, serving fallback"
                );
                let response = fallback.resolve(error).await;
                timer.emit(&response);
                timer.finish(CallOutcome::Fallback);
                Ok(response)
            }
            _ => {
                tracing::debug!(
                    service = %timer.context().service,
                    correlation_id = %request.correlation_id(),
                    error = %error,
                    "Call failed"
                );
                timer.finish(if cancelled { CallOutcome::Cancelled } else { CallOutcome::Error });
                Err(error)
            }
        }
    }

    fn route(&self, request: &Request, config: &ClientConfig) -> Route {
        let Some(service) = request.service() else {
            return Route::Absolute;
        };
        match &self.local {
            Some(local) if local.can_handle(service, &config.local, self.resolver.as_ref()) => Route::Local,
            _ => Route::Balanced,
        }
    }

    /// Fully qualified URL: one attempt, no balancing, no breaker.
    async fn execute_absolute(
        &self,
        request: &Request,
        config: &ClientConfig,
        cancel: &CancellationToken,
    ) -> Result<Response, ExecutionError> {
        let (server, path) = split_absolute(request.path()).map_err(|reason| ExecutionError::Transport {
            server: request.path().to_string(),
            error: TransportError::Protocol(reason),
        })?;
        let routed = request.with_path(path);
        let defaults = &config.defaults;

        single_attempt(
            self.transport.as_ref(),
            &server,
            &routed,
            defaults.request_timeout(&config.transport),
            defaults.treat_5xx_as_error,
            config.transport.max_buffered_body_bytes,
            cancel,
        )
        .await
    }

    /// Breaker and bulkhead around the local or balanced path.
    async fn execute_protected(
        self: Arc<Self>,
        route: Route,
        service: ServiceId,
        request: Request,
        config: Arc<ClientConfig>,
        cancel: CancellationToken,
    ) -> Result<Response, ExecutionError> {
        let service_config = config.service(&service);
        let breaker_config = &service_config.circuit_breaker;
        let isolation = Isolation::for_service(service_config);
        let breaker = self.breakers.get(&service, breaker_config);

        let permit = match breaker.try_acquire(breaker_config) {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!(
                    service = %service,
                    correlation_id = %request.correlation_id(),
                    "Circuit open, call short-circuited"
                );
                return Err(ExecutionError::CircuitOpen);
            }
        };

        let slot = match self.bulkheads.try_acquire(&service, &isolation, &config) {
            Ok(slot) => slot,
            Err(full) => {
                permit.complete(Some(Outcome::Rejected));
                tracing::warn!(service = %service, correlation_id = %request.correlation_id(), "{}", full);
                return Err(ExecutionError::Rejected(full.to_string()));
            }
        };

        match isolation {
            Isolation::Semaphore => {
                let result = self
                    .protected(permit, route, &service, &request, &config, &cancel)
                    .await;
                drop(slot);
                result
            }
            Isolation::Thread(pool) => {
                tracing::trace!(service = %service, pool = %pool, "Running on isolated task");
                let (tx, rx) = oneshot::channel();
                let inner = self.clone();
                let callbacks = self.callbacks.clone();
                let token = cancel.clone();

                let task = tokio::spawn(async move {
                    let _slot = slot;
                    let result = AssertUnwindSafe(inner.protected(permit, route, &service, &request, &config, &token))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(ExecutionError::Internal("isolated call panicked".to_string())));
                    // A rejected hand-off drops `tx`; the caller sees the rejection
                    let _ = callbacks.submit(move || {
                        let _ = tx.send(result);
                    });
                });
                let _abort = AbortOnDrop(task);

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
                    received = rx => match received {
                        Ok(result) => result,
                        Err(_) => Err(ExecutionError::Rejected("callback pool saturated".to_string())),
                    },
                }
            }
        }
    }

    /// Run the chosen path under `permit` and report the outcome to it.
    async fn protected(
        &self,
        permit: CircuitPermit,
        route: Route,
        service: &ServiceId,
        request: &Request,
        config: &ClientConfig,
        cancel: &CancellationToken,
    ) -> Result<Response, ExecutionError> {
        let result = match route {
            Route::Local => self.execute_local(service, request, config, cancel).await,
            _ => self.executor.execute(service, request, config, cancel).await,
        };

        match result {
            Err(ExecutionError::Local(LocalError::NotSupported(reason))) => {
                permit.complete(None);
                tracing::info!(
                    service = %service,
                    correlation_id = %request.correlation_id(),
                    reason = %reason,
                    "Request not representable in-process, using network path"
                );
                self.executor
                    .execute_with(service, request, config, RetryBudget::new(0, 0), cancel)
                    .await
            }
            Err(ExecutionError::Cancelled) => {
                drop(permit);
                Err(ExecutionError::Cancelled)
            }
            other => {
                permit.complete(mapping::outcome_of(&other));
                other
            }
        }
    }

    async fn execute_local(
        &self,
        service: &ServiceId,
        request: &Request,
        config: &ClientConfig,
        cancel: &CancellationToken,
    ) -> Result<Response, ExecutionError> {
        let Some(local) = &self.local else {
            return Err(ExecutionError::Local(LocalError::NotSupported(
                "local path disabled".to_string(),
            )));
        };
        let limit = config.transport.max_buffered_body_bytes;
        let treat_5xx_as_error = config.service(service).treat_5xx_as_error;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
            result = local.execute(request, limit) => match result {
                Ok(response) => classify(response, treat_5xx_as_error, limit).await,
                Err(error) => Err(ExecutionError::Local(error)),
            },
        }
    }
}

/// Aborts the isolated task if the caller goes away first.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn label(request: &Request) -> String {
    request
        .service()
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|| "absolute".to_string())
}

/// Split an absolute URL into the server and the origin-form path.
fn split_absolute(raw: &str) -> Result<(ServerCandidate, String), String> {
    let url = url::Url::parse(raw).map_err(|e| format!("invalid absolute url '{}': {}", raw, e))?;
    let scheme = match url.scheme() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        other => return Err(format!("unsupported scheme '{}'", other)),
    };
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| format!("no host in '{}'", raw))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| format!("no port in '{}'", raw))?;

    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }
    Ok((ServerCandidate::new(host, port, scheme), path))
}
