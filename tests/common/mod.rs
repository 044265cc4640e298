//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use api_traffic::config::AppConfig;
use api_traffic::http::{AppState, HttpServer};
use api_traffic::lifecycle::Shutdown;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A running server on an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub shutdown: Shutdown,
    pub config_updates: mpsc::UnboundedSender<AppConfig>,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the full server. The listener is bound before returning, so
/// requests can be sent immediately.
pub async fn start_server(config: AppConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_updates, updates_rx) = mpsc::unbounded_channel();
    let server = HttpServer::new(config);
    let state = server.state().clone();
    let handle = tokio::spawn(server.run(listener, updates_rx, shutdown.subscribe()));

    TestServer {
        addr,
        state,
        shutdown,
        config_updates,
        handle,
    }
}

/// Serve an arbitrary router (for handlers the stock server does not have).
pub async fn serve_router(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    addr
}

/// Poll `check` every 20ms until it holds or `timeout` elapses.
pub async fn eventually<F: FnMut() -> bool>(timeout: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
