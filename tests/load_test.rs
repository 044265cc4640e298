//! Load testing for the traffic pipeline.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use api_traffic::config::{AppConfig, RateLimitConfig};
use serde_json::Value;

mod common;

fn config(max_requests: u32) -> AppConfig {
    AppConfig {
        rate_limit: RateLimitConfig {
            max_requests,
            ..RateLimitConfig::default()
        },
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_concurrent_requests_counted_exactly() {
    let server = common::start_server(config(100_000)).await;

    let concurrency = 20;
    let requests_per_task = 25;
    let total_requests = concurrency * requests_per_task;

    let client = reqwest::Client::new();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for task in 0..concurrency {
        let client = client.clone();
        let url = server.url("/api/devices");
        tasks.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for _ in 0..requests_per_task {
                let res = client
                    .get(&url)
                    .header("x-forwarded-for", format!("10.1.0.{}", task))
                    .send()
                    .await
                    .unwrap();
                assert!(res.status().is_success());
                ids.push(res.headers()["x-request-id"].to_str().unwrap().to_string());
            }
            ids
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        ids.extend(task.await.unwrap());
    }
    let duration = start.elapsed();

    assert_eq!(ids.len(), total_requests, "every request gets a distinct id");

    let summary: Value = client
        .get(server.url("/metrics/summary"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["total_requests"], total_requests as u64);
    assert_eq!(summary["total_errors"], 0);

    println!("\n--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!(
        "Requests/sec:   {:.2}",
        total_requests as f64 / duration.as_secs_f64()
    );
    println!("-------------------------\n");

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_concurrent_burst_admits_exactly_limit() {
    let limit = 50;
    let server = common::start_server(config(limit)).await;
    let client = reqwest::Client::new();

    let mut tasks = Vec::new();
    for _ in 0..(limit * 2) {
        let client = client.clone();
        let url = server.url("/api/devices");
        tasks.push(tokio::spawn(async move {
            client
                .get(&url)
                .header("x-forwarded-for", "203.0.113.9")
                .send()
                .await
                .unwrap()
                .status()
                .as_u16()
        }));
    }

    let (mut admitted, mut rejected) = (0, 0);
    for task in tasks {
        match task.await.unwrap() {
            200 => admitted += 1,
            429 => rejected += 1,
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(admitted, limit);
    assert_eq!(rejected, limit);

    let stats = server
        .state
        .monitor
        .get_endpoint("GET", "/api/devices")
        .unwrap();
    assert_eq!(stats.call_count, u64::from(limit * 2));
    assert_eq!(stats.status_codes.get(&429).copied(), Some(u64::from(limit)));

    server.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
