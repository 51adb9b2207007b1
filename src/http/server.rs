//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the chat endpoint
//! - Wire up middleware (tracing, request ID, upgrade timeout)
//! - Swap in reloaded configuration
//! - Stop accepting on shutdown and let sessions drain

use arc_swap::ArcSwap;
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::chat::Runtime;
use crate::config::GatewayConfig;
use crate::http::request::{MakeRequestUuidV4, X_REQUEST_ID};
use crate::http::websocket::chat_handler;
use crate::lifecycle::Shutdown;
use crate::net::ConnectionTracker;

/// Deadline for answering the upgrade request itself.
const UPGRADE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long live sessions get to close after shutdown is triggered.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ArcSwap<Runtime>>,
    pub tracker: ConnectionTracker,
    pub shutdown: Shutdown,
}

/// HTTP server for the chat gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig, shutdown: Shutdown) -> Self {
        let chat_path = config.chat.path.clone();
        let state = AppState {
            runtime: Arc::new(ArcSwap::from_pointee(Runtime::new(config))),
            tracker: ConnectionTracker::new(),
            shutdown,
        };

        let router = Self::build_router(&chat_path, state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(chat_path: &str, state: AppState) -> Router {
        Router::new()
            .route(chat_path, get(chat_handler))
            .fallback(not_found)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuidV4))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                    .layer(TimeoutLayer::new(UPGRADE_TIMEOUT)),
            )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Returns once shutdown was triggered and live sessions have drained.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let runtime = self.state.runtime.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                tracing::info!(
                    backend = %config.backend.base_url,
                    "Configuration reloaded; applies to new connections"
                );
                runtime.store(Arc::new(Runtime::new(config)));
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut shutdown_rx = self.state.shutdown.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                tracing::info!("Shutdown signal received, no longer accepting connections");
            })
            .await?;

        if !self.state.tracker.wait_for_drain(DRAIN_TIMEOUT).await {
            tracing::warn!(
                remaining = self.state.tracker.active_count(),
                "Sessions still open after drain timeout"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
