//! API traffic layer (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ TraceLayer
//!                       │
//!                       ▼
//!                  traffic pipeline ── exempt? ──▶ /health, /docs, /metrics/*
//!                       │
//!        correlation id, RequestTracker::begin
//!                       │
//!              RateLimiter::check ── denied ──▶ 429 envelope
//!                       │
//!                       ▼
//!              timeout ─▶ catch-panic ─▶ handler ◀──▶ ResponseCache
//!                       │
//!        RequestTracker::end ─▶ MetricsMonitor (+ Prometheus mirror)
//!                       │
//!        error envelope, X-Request-ID, X-RateLimit-* headers
//!     ◀──────────────
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use api_traffic::config::watcher::ConfigWatcher;
use api_traffic::lifecycle::startup::resolve_config;
use api_traffic::observability::{logging, metrics};
use api_traffic::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "api-traffic", version, about = "API traffic control and observability layer")]
struct Cli {
    /// Path to a TOML configuration file. Watched for changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = resolve_config(cli.config.as_deref(), cli.bind.as_deref())?;

    logging::init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-traffic starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_requests = config.rate_limit.max_requests,
        window_seconds = config.rate_limit.window_seconds,
        cache_enabled = config.cache.enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Hot reload. The watcher handle must outlive the server.
    let (config_updates, _watcher) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move { shutdown.trigger_on_signal().await }
    });

    let server = HttpServer::new(config);
    let finished = tokio::spawn(server.run(listener, config_updates, server_shutdown)).await;

    match finished {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "Server task failed"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
