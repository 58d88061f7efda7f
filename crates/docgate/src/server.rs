//! WebSocket transport wiring.
//!
//! Binds the gateway to an axum WebSocket endpoint. Inbound text frames
//! parse as JSON and run through the receive stage strictly in arrival
//! order — the next frame is not read until the previous stage resolved,
//! which preserves the per-connection ordering the engine relies on.
//! Outbound frames drain from the session's channel.

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::hooks::{ConnectRequest, Gateway, ReceiveRequest};

/// Query parameters for the WebSocket endpoint.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Connection-establishment credentials, resolved to an identity at
    /// connect time.
    pub auth: Option<String>,
}

/// Shared state for the WebSocket handler.
#[derive(Clone)]
pub struct GatewayServer {
    gateway: Arc<Gateway>,
}

impl GatewayServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> Arc<Gateway> {
        self.gateway.clone()
    }

    /// Router with the sync endpoint at the specified path.
    pub fn into_router_at(self, path: &str) -> Router {
        Router::new().route(path, get(ws_handler)).with_state(self)
    }
}

async fn ws_handler(
    State(state): State<GatewayServer>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.auth))
}

async fn handle_socket(socket: WebSocket, state: GatewayServer, credentials: Option<String>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();

    let session = state
        .gateway
        .on_connect(ConnectRequest {
            credentials: credentials.as_deref(),
            outbound: Some(out_tx),
        })
        .await;

    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let message: Value = match serde_json::from_str(&text) {
                            Ok(value) => value,
                            Err(e) => {
                                debug!(
                                    "ignoring non-JSON frame from {}: {}",
                                    session.connection_id(),
                                    e
                                );
                                continue;
                            }
                        };
                        state
                            .gateway
                            .on_receive(ReceiveRequest {
                                session: &session,
                                message: &message,
                            })
                            .await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if ws_tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!("client requested close");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }

            outbound = out_rx.recv() => {
                match outbound {
                    Some(frame) => {
                        if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                            error!("failed to send frame: {}", e);
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.gateway.on_disconnect(&session);
}
