//! Failure injection tests driven by a scripted transport.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

use fleet_transport::config::{CallbackPoolConfig, ClientConfig, ServiceConfig, ThreadPoolConfig};
use fleet_transport::error::TransportError;
use fleet_transport::executor::{Adjustment, AdaptiveCallbackPool, PoolWatchdog};
use fleet_transport::resilience::CircuitState;
use fleet_transport::{ClientError, FailureCause, Gateway, Request, ServiceId};

mod common;

use common::ScriptedTransport;

fn service(candidates: &[&str]) -> ServiceConfig {
    ServiceConfig {
        candidates: candidates.iter().map(|c| c.to_string()).collect(),
        ..ServiceConfig::default()
    }
}

fn gateway(config: ClientConfig, transport: &Arc<ScriptedTransport>) -> Gateway {
    Gateway::builder(config).transport(transport.clone()).build()
}

#[tokio::test]
async fn test_same_server_budget_is_exact() {
    let transport = ScriptedTransport::new();
    transport.script("10.0.0.1:80", vec![Err(TransportError::Connect("reset".into()))]);

    let mut config = ClientConfig::default();
    config.services.insert(
        "orders".into(),
        ServiceConfig {
            max_same_server_retries: 4,
            ..service(&["10.0.0.1:80"])
        },
    );
    let gateway = gateway(config, &transport);

    let err = gateway.execute(Request::get("orders", "/"), None).await.unwrap_err();
    assert!(matches!(err.cause(), Some(FailureCause::Connect(_))));
    assert_eq!(transport.call_count(), 5);
}

#[tokio::test]
async fn test_circuit_opens_and_short_circuits() {
    let transport = ScriptedTransport::new();
    transport.script("10.0.0.1:80", vec![Err(TransportError::Connect("refused".into()))]);

    let mut config = ClientConfig::default();
    let mut orders = service(&["10.0.0.1:80"]);
    orders.circuit_breaker.request_volume_threshold = 4;
    orders.circuit_breaker.error_threshold_percentage = 50;
    orders.circuit_breaker.sleep_window_ms = 60_000;
    config.services.insert("orders".into(), orders);
    let gateway = gateway(config, &transport);
    let id = ServiceId::new("orders");

    for _ in 0..4 {
        let err = gateway.execute(Request::get("orders", "/"), None).await.unwrap_err();
        assert!(!err.is_circuit_open());
    }
    assert_eq!(gateway.circuit_state(&id), Some(CircuitState::Open));

    let err = gateway.execute(Request::get("orders", "/"), None).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(transport.call_count(), 4);
}

#[tokio::test]
async fn test_circuit_opens_when_threshold_is_reached_by_a_success() {
    let transport = ScriptedTransport::new();
    let refused = || Err(TransportError::Connect("refused".into()));
    transport.script("10.0.0.1:80", vec![refused(), refused(), refused(), Ok(StatusCode::OK)]);

    let mut config = ClientConfig::default();
    let mut orders = service(&["10.0.0.1:80"]);
    orders.circuit_breaker.request_volume_threshold = 4;
    orders.circuit_breaker.error_threshold_percentage = 50;
    orders.circuit_breaker.sleep_window_ms = 60_000;
    config.services.insert("orders".into(), orders);
    let gateway = gateway(config, &transport);

    for _ in 0..3 {
        assert!(gateway.execute(Request::get("orders", "/"), None).await.is_err());
    }
    let response = gateway.execute(Request::get("orders", "/"), None).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(gateway.circuit_state(&ServiceId::new("orders")), Some(CircuitState::Open));

    let err = gateway.execute(Request::get("orders", "/"), None).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(transport.call_count(), 4);
}

#[tokio::test]
async fn test_force_closed_never_short_circuits() {
    let transport = ScriptedTransport::new();
    let mut config = ClientConfig::default();
    let mut orders = service(&["10.0.0.1:80"]);
    orders.circuit_breaker.request_volume_threshold = 1;
    orders.circuit_breaker.force_closed = true;
    config.services.insert("orders".into(), orders);
    let gateway = gateway(config, &transport);

    for _ in 0..5 {
        let err = gateway.execute(Request::get("orders", "/"), None).await.unwrap_err();
        assert!(!err.is_circuit_open());
    }
    assert_eq!(transport.call_count(), 5);
    assert_eq!(gateway.circuit_state(&ServiceId::new("orders")), Some(CircuitState::Closed));
}

#[tokio::test]
async fn test_force_open_rejects_without_network() {
    let transport = ScriptedTransport::new();
    transport.script("10.0.0.1:80", vec![Ok(StatusCode::OK)]);
    let mut config = ClientConfig::default();
    let mut orders = service(&["10.0.0.1:80"]);
    orders.circuit_breaker.force_open = true;
    config.services.insert("orders".into(), orders);
    let gateway = gateway(config, &transport);

    let err = gateway.execute(Request::get("orders", "/"), None).await.unwrap_err();
    assert!(matches!(err, ClientError::CircuitOpen { .. }));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_client_errors_are_not_retried_and_keep_circuit_closed() {
    let transport = ScriptedTransport::new();
    transport.script("10.0.0.1:80", vec![Ok(StatusCode::NOT_FOUND)]);
    let mut config = ClientConfig::default();
    let mut orders = ServiceConfig {
        max_same_server_retries: 3,
        max_next_server_retries: 3,
        ..service(&["10.0.0.1:80", "10.0.0.2:80"])
    };
    orders.circuit_breaker.request_volume_threshold = 2;
    config.services.insert("orders".into(), orders);
    let gateway = gateway(config, &transport);

    for _ in 0..3 {
        let err = gateway.execute(Request::get("orders", "/missing"), None).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert!(!err.is_retriable());
    }
    // 10.0.0.2 is unscripted and would refuse; round robin may start there
    assert!(transport.call_count() >= 3);
    assert_eq!(gateway.circuit_state(&ServiceId::new("orders")), Some(CircuitState::Closed));
}

#[tokio::test]
async fn test_server_errors_as_responses_when_configured() {
    let transport = ScriptedTransport::new();
    transport.script("10.0.0.1:80", vec![Ok(StatusCode::BAD_GATEWAY)]);
    let mut config = ClientConfig::default();
    config.services.insert(
        "orders".into(),
        ServiceConfig {
            treat_5xx_as_error: false,
            max_same_server_retries: 2,
            ..service(&["10.0.0.1:80"])
        },
    );
    let gateway = gateway(config, &transport);

    let response = gateway.execute(Request::get("orders", "/"), None).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_three_candidates_two_down_succeeds_within_three_attempts() {
    let transport = ScriptedTransport::new();
    transport.script("10.0.0.2:80", vec![Ok(StatusCode::OK)]);
    let mut config = ClientConfig::default();
    config.services.insert(
        "orders".into(),
        ServiceConfig {
            max_next_server_retries: 2,
            ..service(&["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"])
        },
    );
    let gateway = gateway(config, &transport);

    for round in 1..=5 {
        let before = transport.call_count();
        let response = gateway.execute(Request::get("orders", "/"), None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "round {round}");
        assert!(transport.call_count() - before <= 3);
    }
}

#[tokio::test]
async fn test_cancel_between_attempts_stops_retries() {
    let transport = ScriptedTransport::new();
    let mut config = ClientConfig::default();
    config.services.insert(
        "orders".into(),
        ServiceConfig {
            max_same_server_retries: 5,
            retry_backoff_base_ms: 500,
            retry_backoff_max_ms: 500,
            ..service(&["10.0.0.1:80"])
        },
    );
    let gateway = gateway(config, &transport);

    let future = gateway.execute(Request::get("orders", "/"), None);
    let token = future.cancellation_token();
    let handle = tokio::spawn(future);

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let err = handle.await.unwrap().unwrap_err();
    assert_eq!(err.cause(), Some(&FailureCause::Cancelled));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_cancelled_call_skips_fallback() {
    let transport = ScriptedTransport::new();
    transport.set_delay(Duration::from_secs(5));
    let mut config = ClientConfig::default();
    config.services.insert("orders".into(), service(&["10.0.0.1:80"]));
    let gateway = gateway(config, &transport);

    let fallback = fleet_transport::Fallback::value(fleet_transport::Response::buffered(StatusCode::OK, "fb"));
    let future = gateway.execute(Request::get("orders", "/"), Some(fallback));
    let token = future.cancellation_token();
    let handle = tokio::spawn(future);

    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();
    let err = handle.await.unwrap().unwrap_err();
    assert_eq!(err.cause(), Some(&FailureCause::Cancelled));
}

#[tokio::test]
async fn test_thread_isolation_bounds_concurrency() {
    let transport = ScriptedTransport::new();
    transport.script("10.0.0.1:80", vec![Ok(StatusCode::OK)]);
    transport.set_delay(Duration::from_millis(300));

    let mut config = ClientConfig::default();
    config
        .thread_pools
        .insert("slow".into(), ThreadPoolConfig { max_concurrent: 1 });
    config.services.insert(
        "orders".into(),
        ServiceConfig {
            isolation_thread_pool_override: Some("slow".into()),
            ..service(&["10.0.0.1:80"])
        },
    );
    let gateway = gateway(config, &transport);

    let first = tokio::spawn(gateway.execute(Request::get("orders", "/a"), None));
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = gateway.execute(Request::get("orders", "/b"), None).await;

    let err = second.unwrap_err();
    assert!(matches!(err.cause(), Some(FailureCause::Rejected(_))));
    assert_eq!(first.await.unwrap().unwrap().status(), StatusCode::OK);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_isolated_result_delivered_while_callbacks_block() {
    let transport = ScriptedTransport::new();
    transport.script("10.0.0.1:80", vec![Ok(StatusCode::OK)]);

    let mut config = ClientConfig::default();
    config.callback_pool.core_size = 1;
    config.callback_pool.watchdog_initial_delay_ms = 50;
    config.callback_pool.watchdog_interval_ms = 50;
    config
        .thread_pools
        .insert("isolated".into(), ThreadPoolConfig { max_concurrent: 4 });
    config.services.insert(
        "orders".into(),
        ServiceConfig {
            isolation_thread_pool_override: Some("isolated".into()),
            ..service(&["10.0.0.1:80"])
        },
    );
    let gateway = gateway(config, &transport);

    // Occupy every callback thread with a consumer that never returns on its own
    let (release, blocked) = mpsc::channel::<()>();
    gateway
        .callback_pool()
        .submit(move || {
            let _ = blocked.recv();
        })
        .unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        gateway.execute(Request::get("orders", "/"), None),
    )
    .await
    .expect("isolated call starved behind blocked callbacks");
    assert_eq!(result.unwrap().status(), StatusCode::OK);
    assert!(gateway.callback_pool().core_size() >= 2);
    assert_eq!(transport.call_count(), 1);

    drop(release);
}

#[tokio::test]
async fn test_semaphore_isolation_rejects_over_limit() {
    let transport = ScriptedTransport::new();
    transport.script("10.0.0.1:80", vec![Ok(StatusCode::OK)]);
    transport.set_delay(Duration::from_millis(300));

    let mut config = ClientConfig::default();
    config.services.insert(
        "orders".into(),
        ServiceConfig {
            max_concurrent_requests: 1,
            ..service(&["10.0.0.1:80"])
        },
    );
    let gateway = gateway(config, &transport);

    let first = tokio::spawn(gateway.execute(Request::get("orders", "/"), None));
    tokio::time::sleep(Duration::from_millis(50)).await;
    let err = gateway.execute(Request::get("orders", "/"), None).await.unwrap_err();

    assert!(matches!(err.cause(), Some(FailureCause::Rejected(_))));
    assert!(first.await.unwrap().is_ok());
}

#[test]
fn test_watchdog_grows_then_converges_to_baseline() {
    let config = CallbackPoolConfig {
        core_size: 1,
        max_size: 4,
        keep_alive_ms: 60_000,
        ..CallbackPoolConfig::default()
    };
    let pool = Arc::new(AdaptiveCallbackPool::new(&config));
    let watchdog = PoolWatchdog::new(pool.clone(), &config);

    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Arc::new(std::sync::Mutex::new(release_rx));
    for _ in 0..4 {
        let rx = release_rx.clone();
        pool.submit(move || {
            let _ = rx.lock().unwrap().recv();
        })
        .unwrap();
    }

    wait_for(|| {
        let stats = pool.stats();
        stats.active == 1 && stats.queue_depth == 3
    });
    assert_eq!(watchdog.tick(), Adjustment::Grow(4));
    assert_eq!(pool.core_size(), 4);

    for _ in 0..4 {
        release_tx.send(()).unwrap();
    }
    wait_for(|| pool.stats().completed == 4);

    let mut steps = Vec::new();
    loop {
        match watchdog.tick() {
            Adjustment::Hold => break,
            adjustment => steps.push(adjustment),
        }
    }
    assert_eq!(
        steps,
        vec![Adjustment::Shrink(3), Adjustment::Shrink(2), Adjustment::Shrink(1)]
    );
    assert_eq!(pool.core_size(), 1);
    assert_eq!(watchdog.tick(), Adjustment::Hold);
}

fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("condition not reached");
}
