//! Control websocket
//!
//! Every connection may send commands; whatever a command produces is
//! broadcast to all connections. Registry changes can block on JACK, so
//! commands run on the blocking pool.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::ui::server::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let mut outbound = state.broadcast_tx.subscribe();
    tracing::debug!("Control client connected");

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => dispatch(&state, text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("Websocket error: {}", e);
                    break;
                }
            },
            message = outbound.recv() => match message {
                Ok(json) => {
                    if sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Control client missed {} broadcasts", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracing::debug!("Control client disconnected");
}

async fn dispatch(state: &AppState, text: String) {
    let control = state.control.clone();
    let result = tokio::task::spawn_blocking(move || control.dispatch(&text)).await;

    match result {
        Ok(Ok(broadcasts)) => {
            for broadcast in broadcasts {
                // no receivers just means nobody is listening right now
                let _ = state.broadcast_tx.send(broadcast.to_json());
            }
        }
        Ok(Err(e)) if e.is_fatal() => {
            tracing::error!("Fatal error: {}", e);
            std::process::exit(1);
        }
        Ok(Err(e)) => tracing::warn!("Command failed: {}", e),
        Err(e) => tracing::error!("Command handler panicked: {}", e),
    }
}
