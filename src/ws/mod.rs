pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::hub::Outgoing;
use crate::protocol::{ClientMessage, ServerEvent};
use crate::state::AppState;
use crate::types::{normalize_ip, ConnectionId, Identity, SessionId};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub session: Option<String>,
}

/// WebSocket upgrade handler. Only logged-in, unbanned sessions get a socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let ip = normalize_ip(addr.ip());

    let Some(session_id) = params.session.filter(|s| !s.is_empty()) else {
        return (StatusCode::UNAUTHORIZED, "Not logged in.").into_response();
    };
    let Ok(identity) = state.identity(&session_id).await else {
        tracing::debug!(ip = %ip, "WebSocket request with unknown session");
        return (StatusCode::UNAUTHORIZED, "Not logged in.").into_response();
    };
    if state.is_banned(&identity.username, &ip).await {
        tracing::warn!(username = %identity.username, ip = %ip, "Banned user tried to connect");
        return (StatusCode::FORBIDDEN, "You are banned.").into_response();
    }

    tracing::info!(username = %identity.username, ip = %ip, "WebSocket connection request");

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity, session_id, ip))
}

async fn send_event(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize {}: {}", event.name(), e);
            true
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    identity: Identity,
    session_id: SessionId,
    ip: String,
) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id: ConnectionId = ulid::Ulid::new().to_string();

    // Attach before registering so the first broadcasts are not lost
    let mut outgoing = state.hub.attach(&conn_id).await;
    if let Err(e) = state.connect(&conn_id, &identity, &session_id, &ip).await {
        tracing::warn!(error = %e, "Rejected WebSocket registration");
        state.hub.detach(&conn_id).await;
        let _ = send_event(&mut sender, &ServerEvent::error(e.to_string())).await;
        return;
    }

    tracing::info!(
        connection = %conn_id,
        username = %identity.username,
        admin = identity.is_admin,
        "WebSocket connected"
    );

    loop {
        tokio::select! {
            // Events routed to this connection
            out = outgoing.recv() => {
                match out {
                    Some(Outgoing::Event(event)) => {
                        if !send_event(&mut sender, &event).await {
                            break;
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        tracing::debug!(connection = %conn_id, "Closing socket on server request");
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            // Handle client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if let Some(reply) =
                                    handlers::handle_message(&state, &conn_id, client_msg).await
                                {
                                    if !send_event(&mut sender, &reply).await {
                                        tracing::error!("Failed to send reply");
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::warn!(connection = %conn_id, "Failed to parse client message: {}", e);
                                let error = ServerEvent::error(format!("Invalid message format: {}", e));
                                let _ = send_event(&mut sender, &error).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!(connection = %conn_id, "WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(connection = %conn_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.disconnect(&conn_id).await;
    state.hub.detach(&conn_id).await;
    tracing::info!(connection = %conn_id, username = %identity.username, "WebSocket connection closed");
}
