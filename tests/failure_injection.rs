//! Failure paths over real HTTP: rejections, correlation on errors,
//! abandoned requests, hot reload and shutdown.

use std::time::Duration;

use api_traffic::config::{AppConfig, RateLimitConfig};
use api_traffic::http::middleware::traffic_pipeline;
use api_traffic::http::AppState;
use axum::{middleware, routing::get, Router};
use serde_json::Value;

mod common;

fn config(max_requests: u32) -> AppConfig {
    AppConfig {
        rate_limit: RateLimitConfig {
            max_requests,
            window_seconds: 60,
            ..RateLimitConfig::default()
        },
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_rejection_carries_retry_after_and_correlation() {
    let server = common::start_server(config(2)).await;
    let client = reqwest::Client::new();
    let url = server.url("/api/devices");

    for _ in 0..2 {
        let res = client
            .get(&url)
            .header("x-forwarded-for", "198.51.100.1")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    let res = client
        .get(&url)
        .header("x-forwarded-for", "198.51.100.1")
        .header("x-request-id", "client-chosen-id")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 429);
    assert_eq!(res.headers()["x-request-id"], "client-chosen-id");
    assert_eq!(res.headers()["x-ratelimit-limit"], "2");
    assert_eq!(res.headers()["x-ratelimit-remaining"], "0");
    let retry_after: u64 = res.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error_code"], "RATE_LIMITED");
    assert_eq!(body["request_id"], "client-chosen-id");

    // Rejected request is still tracked and retrievable.
    let ctx: Value = client
        .get(server.url("/metrics/requests/client-chosen-id"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ctx["status_code"], 429);
    assert_eq!(ctx["client_addr"], "198.51.100.1");

    // A different client is unaffected.
    let res = client
        .get(&url)
        .header("x-forwarded-for", "198.51.100.2")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_exempt_paths_never_limited() {
    let server = common::start_server(config(1)).await;
    let client = reqwest::Client::new();

    for _ in 0..10 {
        let res = client.get(server.url("/health")).send().await.unwrap();
        assert_eq!(res.status(), 200);
        assert!(res.headers().contains_key("x-request-id"));
    }
    assert_eq!(server.state.limiter.tracked_clients(), 0);
    assert_eq!(server.state.monitor.get_summary().total_requests, 0);

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_route_enveloped_with_request_id() {
    let server = common::start_server(config(10)).await;
    let res = reqwest::Client::new()
        .get(server.url("/api/nothing-here"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    let request_id = res.headers()["x-request-id"].to_str().unwrap().to_string();

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error_code"], "NOT_FOUND");
    assert_eq!(body["request_id"], request_id.as_str());
    assert_eq!(body["path"], "/api/nothing-here");

    let errors = server.state.monitor.get_recent_errors(10);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].request_id.as_deref(), Some(request_id.as_str()));

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_hot_reload_applies_new_limit() {
    let server = common::start_server(config(100)).await;
    let client = reqwest::Client::new();

    server.config_updates.send(config(1)).unwrap();
    let state = server.state.clone();
    assert!(
        common::eventually(Duration::from_secs(2), || {
            state.limiter.settings().max_requests == 1
        })
        .await
    );

    let send = || {
        client
            .get(server.url("/api/devices"))
            .header("x-forwarded-for", "192.0.2.50")
            .send()
    };
    assert_eq!(send().await.unwrap().status(), 200);
    assert_eq!(send().await.unwrap().status(), 429);

    server.shutdown.trigger();
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "done"
}

#[tokio::test]
async fn test_abandoned_request_recorded_as_client_closed() {
    let state = AppState::from_config(&config(10));
    let router = Router::new()
        .route("/slow", get(slow))
        .layer(middleware::from_fn_with_state(state.clone(), traffic_pipeline));
    let addr = common::serve_router(router).await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let err = client
        .get(format!("http://{}/slow", addr))
        .send()
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    drop(client);

    let monitor = state.monitor.clone();
    let recorded = common::eventually(Duration::from_secs(3), || {
        monitor
            .get_endpoint("GET", "/slow")
            .is_some_and(|s| s.status_codes.get(&499) == Some(&1))
    })
    .await;
    assert!(recorded, "abandoned request should be recorded exactly once as 499");
    assert_eq!(state.tracker.active_count(), 0);
}

#[tokio::test]
async fn test_graceful_shutdown_stops_server() {
    let server = common::start_server(config(10)).await;
    let res = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(res.status(), 200);
    drop(res);

    server.shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not stop in time");
    assert!(result.unwrap().is_ok());
}
