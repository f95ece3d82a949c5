//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::StatusCode;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use fleet_transport::config::{ClientConfig, ServiceConfig};
use fleet_transport::error::TransportError;
use fleet_transport::http::X_REQUEST_ID;
use fleet_transport::load_balancer::ServerCandidate;
use fleet_transport::net::TransportExecutor;
use fleet_transport::{Request, Response};

/// A real HTTP backend on an ephemeral loopback port.
pub struct Backend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    request_ids: Arc<Mutex<Vec<String>>>,
}

impl Backend {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn request_ids(&self) -> Vec<String> {
        self.request_ids.lock().unwrap().clone()
    }
}

/// Start a backend answering every request with `status` and `body`.
pub async fn start_backend(status: u16, body: &'static str) -> Backend {
    start_programmable_backend(move |_| (status, body.to_string())).await
}

/// Start a backend whose answer is computed from the 0-based hit number.
pub async fn start_programmable_backend<F>(f: F) -> Backend
where
    F: Fn(usize) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let request_ids = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let (h, ids) = (hits.clone(), request_ids.clone());
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let (f, h, ids) = (f.clone(), h.clone(), ids.clone());
            tokio::spawn(async move {
                let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                    let n = h.fetch_add(1, Ordering::SeqCst);
                    if let Some(id) = req.headers().get(X_REQUEST_ID).and_then(|v| v.to_str().ok()) {
                        ids.lock().unwrap().push(id.to_string());
                    }
                    let (status, body) = f(n);
                    async move {
                        let mut response = hyper::Response::new(Body::from(body));
                        *response.status_mut() = StatusCode::from_u16(status).unwrap();
                        Ok::<_, Infallible>(response)
                    }
                });
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
            });
        }
    });

    Backend { addr, hits, request_ids }
}

/// An address nothing listens on.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Config with one service pointing at `candidates`.
pub fn config_for(service: &str, candidates: &[String]) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.services.insert(
        service.to_string(),
        ServiceConfig {
            candidates: candidates.to_vec(),
            ..ServiceConfig::default()
        },
    );
    config
}

/// Transport answering from per-server scripts; unscripted servers refuse.
/// The last reply of a script repeats.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<Vec<(String, VecDeque<Result<StatusCode, TransportError>>)>>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, server: &str, replies: Vec<Result<StatusCode, TransportError>>) {
        self.replies
            .lock()
            .unwrap()
            .push((format!("http://{}", server), replies.into()));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TransportExecutor for ScriptedTransport {
    async fn send(&self, server: &ServerCandidate, request: &Request) -> Result<Response, TransportError> {
        let addr = server.to_string();
        self.calls.lock().unwrap().push(addr.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = {
            let mut replies = self.replies.lock().unwrap();
            replies
                .iter_mut()
                .find(|(a, _)| *a == addr)
                .and_then(|(_, queue)| if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() })
        };
        match next {
            Some(Ok(status)) => Ok(Response::buffered(status, format!("{} {}", status.as_u16(), request.path()))),
            Some(Err(e)) => Err(e),
            None => Err(TransportError::Connect(format!("{} refused", addr))),
        }
    }
}
