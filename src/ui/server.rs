//! HTTP server: `/ws` control websocket, `/rest` status, static assets for
//! everything else

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::config::UiConfig;
use crate::ui::control::{ControlHandler, StatusReport};
use crate::ui::websocket::ws_handler;

/// Outbound messages buffered per websocket before a slow client lags
const BROADCAST_CAPACITY: usize = 64;

/// Shared state for all handlers
pub struct AppState {
    pub control: Arc<dyn ControlHandler>,
    /// JSON text sent to every connected websocket
    pub broadcast_tx: broadcast::Sender<String>,
}

pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: UiConfig, control: Arc<dyn ControlHandler>) -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            config,
            state: Arc::new(AppState {
                control,
                broadcast_tx,
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/rest", get(status_handler))
            .fallback_service(ServeDir::new(&self.config.assets_dir))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Address from the configuration
    pub fn address(&self) -> std::io::Result<SocketAddr> {
        format!("{}:{}", self.config.bind_address, self.config.http_port)
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
    }

    pub async fn bind(&self) -> std::io::Result<tokio::net::TcpListener> {
        tokio::net::TcpListener::bind(self.address()?).await
    }

    /// Serve until the task is dropped or the listener fails
    pub async fn serve(self, listener: tokio::net::TcpListener) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Control surface at http://{}", addr);
        }
        axum::serve(listener, self.router()).await
    }
}

async fn status_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusReport>, StatusCode> {
    let control = state.control.clone();
    tokio::task::spawn_blocking(move || control.status())
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
