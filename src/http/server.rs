//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build shared state (limiter, cache, tracker, monitor)
//! - Create Axum Router with monitoring and API routes
//! - Wire up middleware (trace, traffic pipeline, timeout, panic capture)
//! - Apply hot-reloaded configuration
//! - Bind server to listener and drain on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::setup_admin_router;
use crate::cache::ResponseCache;
use crate::config::{AppConfig, ErrorConfig, ExemptPaths};
use crate::http::middleware::traffic_pipeline;
use crate::http::request::RequestTracker;
use crate::http::response::panic_response;
use crate::lifecycle::janitor::Janitor;
use crate::observability::MetricsMonitor;
use crate::routes::devices::{self, DeviceRegistry};
use crate::security::rate_limit::RateLimiter;

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub cache: ResponseCache,
    pub tracker: Arc<RequestTracker>,
    pub monitor: Arc<MetricsMonitor>,
    pub exempt_paths: Arc<ArcSwap<ExemptPaths>>,
    pub errors: ErrorConfig,
    pub devices: Arc<DeviceRegistry>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        let monitor = Arc::new(MetricsMonitor::new(config.monitor.clone()));
        Self {
            limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            cache: ResponseCache::from_config(&config.cache),
            tracker: Arc::new(RequestTracker::new(
                config.tracking.context_capacity,
                monitor.clone(),
            )),
            monitor,
            exempt_paths: Arc::new(ArcSwap::from_pointee(config.exempt_paths.clone())),
            errors: config.errors.clone(),
            devices: Arc::new(DeviceRegistry::new()),
        }
    }

    /// Apply the hot-reloadable parts of a new configuration.
    pub fn apply(&self, config: &AppConfig) {
        self.limiter.reconfigure(config.rate_limit.clone());
        self.exempt_paths.store(Arc::new(config.exempt_paths.clone()));
    }
}

/// HTTP server for the traffic layer.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: AppConfig) -> Self {
        let state = AppState::from_config(&config);
        let router = build_router(&config, state.clone());
        Self {
            router,
            config,
            state,
        }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<AppConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let janitor = Janitor::new(
            self.state.limiter.clone(),
            self.state.cache.clone(),
            Duration::from_secs(self.config.observability.sweep_interval_secs),
        );
        tokio::spawn(janitor.run(shutdown.resubscribe()));

        let reload_state = self.state.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                reload_state.apply(&new_config);
                tracing::info!("Configuration reloaded");
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Clone of the fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(config: &AppConfig, state: AppState) -> Router {
    Router::new()
        .merge(setup_admin_router(state.clone()))
        .merge(devices::router(state.clone()))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        .layer(middleware::from_fn_with_state(state, traffic_pipeline))
        .layer(TraceLayer::new_for_http())
}
