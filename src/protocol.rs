//! Wire protocol
//!
//! Both directions use the same envelope: `{"event": "<name>", "data": {...}}`.
//! Event names and payload field names are camelCase.

use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Ask for the current room list (lobby page load)
    JoinLobby,
    CreateRoom {
        room_name: String,
        max_users: u32,
        password: Option<String>,
    },
    JoinRoom {
        room_id: RoomId,
    },
    SubmitRoomPassword {
        room_id: RoomId,
        password: String,
    },
    LeaveRoom,
    SendMessage {
        message: String,
    },
    UpdateRoomSettings {
        room_id: RoomId,
        room_name: String,
        max_users: u32,
    },
    // Admin-only messages
    /// Subscribe to live dashboard updates
    AdminJoin,
    AdminKickUser {
        connection_id: Option<ConnectionId>,
        username: Option<String>,
    },
    AdminBanUser {
        connection_id: Option<ConnectionId>,
        username: Option<String>,
        #[serde(default)]
        ban_username: bool,
        #[serde(default)]
        ban_ip: bool,
    },
    AdminDeleteRoom {
        room_id: RoomId,
    },
    AdminToggleHideRoom {
        room_id: RoomId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    RoomListUpdate {
        rooms: Vec<RoomSummary>,
        connected_users: usize,
    },
    UserJoined {
        username: String,
        is_admin: bool,
        timestamp: i64,
    },
    UserLeft {
        username: String,
        is_admin: bool,
        timestamp: i64,
    },
    UpdateUserList {
        usernames: Vec<String>,
    },
    NewMessage {
        username: String,
        is_admin: bool,
        message: String,
        timestamp: i64,
    },
    NewImage {
        username: String,
        is_admin: bool,
        url: String,
        timestamp: i64,
    },
    RoomSettingsUpdated {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_users: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    RoomDeleted {
        room_id: RoomId,
    },
    RoomHidden {
        room_id: RoomId,
    },
    RoomShown(RoomSummary),
    AdminUpdate {
        users: Vec<AdminUserInfo>,
        rooms: Vec<AdminRoomInfo>,
        bans: Vec<String>,
    },
    Kicked {
        reason: String,
    },
    Banned {
        reason: String,
    },
    ErrorMsg {
        message: String,
    },
    /// Room history, sent to a user right after joining
    LoadLogs {
        logs: Vec<LogEntry>,
    },
    RoomInfo(RoomInfo),
    RoomCreated {
        room_id: RoomId,
    },
    RoomAccessGranted {
        room_id: RoomId,
    },
    /// Lobby notice that a visible room was renamed or resized
    RoomSettingsChanged(RoomSummary),
    RoomUserCountUpdate {
        room_id: RoomId,
        user_count: usize,
    },
    TotalUserUpdate {
        connected_users: usize,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::ErrorMsg {
            message: message.into(),
        }
    }

    /// Room-scoped event for a log entry, if the entry kind is broadcast live
    pub fn from_log(entry: &LogEntry) -> Option<Self> {
        match &entry.kind {
            LogKind::Join => Some(ServerEvent::UserJoined {
                username: entry.username.clone(),
                is_admin: entry.is_admin,
                timestamp: entry.timestamp,
            }),
            LogKind::Leave => Some(ServerEvent::UserLeft {
                username: entry.username.clone(),
                is_admin: entry.is_admin,
                timestamp: entry.timestamp,
            }),
            LogKind::Message { message } | LogKind::System { message } => {
                Some(ServerEvent::NewMessage {
                    username: entry.username.clone(),
                    is_admin: entry.is_admin,
                    message: message.clone(),
                    timestamp: entry.timestamp,
                })
            }
            LogKind::Image { url } => Some(ServerEvent::NewImage {
                username: entry.username.clone(),
                is_admin: entry.is_admin,
                url: url.clone(),
                timestamp: entry.timestamp,
            }),
        }
    }

    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::RoomListUpdate { .. } => "roomListUpdate",
            ServerEvent::UserJoined { .. } => "userJoined",
            ServerEvent::UserLeft { .. } => "userLeft",
            ServerEvent::UpdateUserList { .. } => "updateUserList",
            ServerEvent::NewMessage { .. } => "newMessage",
            ServerEvent::NewImage { .. } => "newImage",
            ServerEvent::RoomSettingsUpdated { .. } => "roomSettingsUpdated",
            ServerEvent::RoomDeleted { .. } => "roomDeleted",
            ServerEvent::RoomHidden { .. } => "roomHidden",
            ServerEvent::RoomShown(_) => "roomShown",
            ServerEvent::AdminUpdate { .. } => "adminUpdate",
            ServerEvent::Kicked { .. } => "kicked",
            ServerEvent::Banned { .. } => "banned",
            ServerEvent::ErrorMsg { .. } => "errorMsg",
            ServerEvent::LoadLogs { .. } => "loadLogs",
            ServerEvent::RoomInfo(_) => "roomInfo",
            ServerEvent::RoomCreated { .. } => "roomCreated",
            ServerEvent::RoomAccessGranted { .. } => "roomAccessGranted",
            ServerEvent::RoomSettingsChanged(_) => "roomSettingsChanged",
            ServerEvent::RoomUserCountUpdate { .. } => "roomUserCountUpdate",
            ServerEvent::TotalUserUpdate { .. } => "totalUserUpdate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_envelope() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"event":"joinRoom","data":{"roomId":"abc"}}"#).unwrap();
        assert!(matches!(msg, ClientMessage::JoinRoom { room_id } if room_id == "abc"));

        let msg: ClientMessage = serde_json::from_str(r#"{"event":"joinLobby"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::JoinLobby));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"event":"createRoom","data":{"roomName":"Lobby Chat","maxUsers":2}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::CreateRoom {
                room_name,
                max_users,
                password,
            } => {
                assert_eq!(room_name, "Lobby Chat");
                assert_eq!(max_users, 2);
                assert!(password.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_ban_flags_default_to_false() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"event":"adminBanUser","data":{"username":"mallory"}}"#)
                .unwrap();
        match msg {
            ClientMessage::AdminBanUser {
                connection_id,
                username,
                ban_username,
                ban_ip,
            } => {
                assert!(connection_id.is_none());
                assert_eq!(username.as_deref(), Some("mallory"));
                assert!(!ban_username);
                assert!(!ban_ip);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_server_event_names_match_wire() {
        let events = vec![
            ServerEvent::UpdateUserList {
                usernames: vec!["A".to_string()],
            },
            ServerEvent::RoomDeleted {
                room_id: "r1".to_string(),
            },
            ServerEvent::error("nope"),
            ServerEvent::TotalUserUpdate { connected_users: 3 },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], event.name());
        }
    }

    #[test]
    fn test_settings_update_omits_absent_fields() {
        let event = ServerEvent::RoomSettingsUpdated {
            success: false,
            room_name: None,
            max_users: None,
            message: Some("Room not found".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"]["success"], false);
        assert_eq!(json["data"]["message"], "Room not found");
        assert!(json["data"].get("roomName").is_none());
        assert!(json["data"].get("maxUsers").is_none());
    }

    #[test]
    fn test_room_shown_carries_summary() {
        let event = ServerEvent::RoomShown(RoomSummary {
            id: "r1".to_string(),
            name: "Lounge".to_string(),
            user_count: 1,
            max_users: 5,
            has_password: false,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "roomShown");
        assert_eq!(json["data"]["id"], "r1");
        assert_eq!(json["data"]["userCount"], 1);
        assert_eq!(json["data"]["maxUsers"], 5);
    }
}
