//! HTTP server exposing the broadcast engine
//!
//! | Path | Description |
//! |------|-------------|
//! | `GET /` | Redirect to `/home` |
//! | `GET /home` | Listener page |
//! | `GET /controller` | Controller page |
//! | `POST /controller` | `{"command": "start" \| "stop"}` |
//! | `GET /stream` | Live audio stream (chunked) |
//! | `GET /status` | Broadcast state and counters |
//! | anything else | Static files from the public directory |

use axum::{
    routing::{get, get_service},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::broadcast::BroadcastController;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::ui::handlers;

/// Shared state passed to all request handlers
pub struct AppState {
    pub controller: Arc<BroadcastController>,
    pub config: AppConfig,
}

/// Build the router; split out so tests can drive it without a socket
pub fn create_router(state: Arc<AppState>) -> Router {
    let public_dir = state.config.ui.public_dir.clone();
    let home = ServeFile::new(state.config.home_page_path());
    let controller_page = ServeFile::new(state.config.controller_page_path());

    Router::new()
        .route("/", get(handlers::root))
        .route("/home", get_service(home))
        .route(
            "/controller",
            get_service(controller_page).post(handlers::command),
        )
        .route("/stream", get(handlers::stream))
        .route("/status", get(handlers::status))
        .fallback_service(ServeDir::new(public_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct WebServer {
    config: AppConfig,
    controller: Arc<BroadcastController>,
}

impl WebServer {
    pub fn new(config: AppConfig, controller: Arc<BroadcastController>) -> Self {
        Self { config, controller }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.ui.bind_address, self.config.ui.http_port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address: {}", e)))
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.bind_addr()?;
        let state = Arc::new(AppState {
            controller: self.controller,
            config: self.config,
        });
        let app = create_router(state);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Web UI listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
