//! The Hub: HTTP ingress, worker registry, model index, dispatch, liveness.

pub mod dispatch;
pub mod http;
pub mod liveness;
pub mod registry;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::HubConfig;
use registry::Registry;

/// Shared application state, handed to every axum handler via `State`.
///
/// Constructed once inside [`Hub::run`] and passed by reference to every
/// HTTP handler — the historical Go source kept a process-wide singleton
/// (`examples/original_source/hub/hub.go`'s package-level `var hub`), which
/// this deliberately does not reproduce (spec.md §9's "Global state" note).
pub struct Hub {
    pub registry: Registry,
    pub cancel: CancellationToken,
}

impl Hub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: Registry::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Builds the axum router for a hub instance. Exposed (not just used
    /// internally by [`Hub::run`]) so integration tests can serve it on an
    /// ephemeral port without going through the `server` CLI subcommand.
    pub fn into_router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/", get(http::index))
            .route("/v1/completions", post(http::completions))
            .route("/v1/models", get(http::list_models))
            .route("/internal/v1/workers", get(http::list_workers))
            .route("/internal/v1/worker/ws", get(http::worker_ws))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    /// Constructs a hub and binds `listen` without serving, so the caller
    /// can inspect the bound address (e.g. an ephemeral `:0` port) before
    /// starting the server.
    pub async fn bind(listen: &str) -> anyhow::Result<(Arc<Self>, tokio::net::TcpListener)> {
        let hub = Self::new();
        let listener = tokio::net::TcpListener::bind(listen).await?;
        Ok((hub, listener))
    }

    /// Binds `config.listen`, serves HTTP, and starts the liveness probe.
    /// Runs until a ctrl-c signal arrives, at which point the axum server
    /// drains in-flight connections and the liveness loop is cancelled.
    pub async fn run(config: HubConfig) -> anyhow::Result<()> {
        let (hub, listener) = Self::bind(&config.listen).await?;
        log::info!("listening on {}", config.listen);

        tokio::spawn(liveness::run(hub.clone(), hub.cancel.child_token()));

        let app = hub.clone().into_router();
        let shutdown_cancel = hub.cancel.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = tokio::signal::ctrl_c().await;
                log::info!("shutdown signal received");
                shutdown_cancel.cancel();
            })
            .await?;

        Ok(())
    }
}
