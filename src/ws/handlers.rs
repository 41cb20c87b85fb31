//! WebSocket message dispatch
//!
//! Maps each client message onto an engine operation. Successful operations
//! deliver their own events through the hub; the return value is only the
//! error reply for the acting connection, if any.

use crate::error::{ChatError, ChatResult};
use crate::protocol::{ClientMessage, ServerEvent};
use crate::state::admin::AdminTarget;
use crate::state::AppState;
use crate::types::ConnectionId;
use std::sync::Arc;

const FLOOD_MESSAGE: &str = "You are sending messages too fast. Please slow down.";

/// Handle a client message and return an optional error reply
pub async fn handle_message(
    state: &Arc<AppState>,
    conn_id: &ConnectionId,
    msg: ClientMessage,
) -> Option<ServerEvent> {
    match msg {
        ClientMessage::UpdateRoomSettings {
            room_id,
            room_name,
            max_users,
        } => {
            let result = state
                .update_room_settings(conn_id, &room_id, &room_name, max_users)
                .await;
            // Settings failures come back on the settings channel
            result.err().filter(ChatError::needs_report).map(|e| {
                tracing::debug!(connection = %conn_id, error = %e, "Settings update rejected");
                ServerEvent::RoomSettingsUpdated {
                    success: false,
                    room_name: None,
                    max_users: None,
                    message: Some(e.to_string()),
                }
            })
        }

        ClientMessage::SendMessage { message } => {
            if let Some(guard) = &state.flood_guard {
                if !guard.check(conn_id).await {
                    tracing::warn!(connection = %conn_id, "Chat flood limit hit");
                    return Some(ServerEvent::error(FLOOD_MESSAGE));
                }
            }
            report(conn_id, state.send_message(conn_id, &message).await)
        }

        other => report(conn_id, dispatch(state, conn_id, other).await),
    }
}

async fn dispatch(
    state: &Arc<AppState>,
    conn_id: &ConnectionId,
    msg: ClientMessage,
) -> ChatResult<()> {
    match msg {
        ClientMessage::JoinLobby => state.join_lobby(conn_id).await,

        ClientMessage::CreateRoom {
            room_name,
            max_users,
            password,
        } => state
            .create_room(conn_id, &room_name, max_users, password.as_deref())
            .await
            .map(|_| ()),

        ClientMessage::JoinRoom { room_id } => state.join_room(conn_id, &room_id).await,

        ClientMessage::SubmitRoomPassword { room_id, password } => {
            state
                .submit_room_password(conn_id, &room_id, &password)
                .await
        }

        ClientMessage::LeaveRoom => {
            state.leave_room(conn_id).await;
            Ok(())
        }

        // Admin-only commands (authorization checked inside the engine)
        ClientMessage::AdminJoin => state.admin_subscribe(conn_id).await,

        ClientMessage::AdminKickUser {
            connection_id,
            username,
        } => {
            let target = AdminTarget::from_parts(connection_id, username)?;
            state.kick(conn_id, &target).await.map(|_| ())
        }

        ClientMessage::AdminBanUser {
            connection_id,
            username,
            ban_username,
            ban_ip,
        } => {
            let target = AdminTarget::from_parts(connection_id, username)?;
            state.ban(conn_id, &target, ban_username, ban_ip).await
        }

        ClientMessage::AdminDeleteRoom { room_id } => state.delete_room(conn_id, &room_id).await,

        ClientMessage::AdminToggleHideRoom { room_id } => {
            state.toggle_hidden(conn_id, &room_id).await.map(|_| ())
        }

        ClientMessage::SendMessage { message } => state.send_message(conn_id, &message).await,

        ClientMessage::UpdateRoomSettings {
            room_id,
            room_name,
            max_users,
        } => {
            state
                .update_room_settings(conn_id, &room_id, &room_name, max_users)
                .await
        }
    }
}

fn report(conn_id: &ConnectionId, result: ChatResult<()>) -> Option<ServerEvent> {
    match result {
        Ok(()) => None,
        Err(e) if !e.needs_report() => None,
        Err(e) => {
            tracing::debug!(connection = %conn_id, error = %e, "Request rejected");
            Some(ServerEvent::error(e.to_string()))
        }
    }
}
