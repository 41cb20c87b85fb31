use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Opaque ID types for type safety
pub type ConnectionId = String;
pub type RoomId = String;
pub type SessionId = String;

pub const ROOM_NAME_MIN_CHARS: usize = 3;
pub const ROOM_NAME_MAX_CHARS: usize = 30;
pub const MIN_CAPACITY: u32 = 1;
pub const MAX_CAPACITY: u32 = 100;
pub const USERNAME_MIN_CHARS: usize = 3;
pub const USERNAME_MAX_CHARS: usize = 20;
pub const MAX_MESSAGE_CHARS: usize = 500;
/// Rooms keep only the most recent entries
pub const MAX_LOG_ENTRIES: usize = 150;

/// Label used for the admin dashboard when a user is not in any room
pub const LOBBY_LABEL: &str = "Lobby/Main";

/// Who a session belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub username: String,
    pub is_admin: bool,
}

impl Identity {
    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_admin: false,
        }
    }

    pub fn admin(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_admin: true,
        }
    }
}

/// A live link to one client
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub username: String,
    pub is_admin: bool,
    pub session_id: SessionId,
    pub ip: String,
    /// Back-reference only; the room itself lives in the room table
    pub room: Option<RoomId>,
}

/// Room member as seen by other members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub username: String,
    pub is_admin: bool,
}

/// One record in a room's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(flatten)]
    pub kind: LogKind,
    pub username: String,
    pub is_admin: bool,
    /// Milliseconds since the unix epoch
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogKind {
    Message { message: String },
    Image { url: String },
    Join,
    Leave,
    System { message: String },
}

impl LogEntry {
    pub fn new(kind: LogKind, username: &str, is_admin: bool) -> Self {
        Self {
            kind,
            username: username.to_string(),
            is_admin,
            timestamp: now_millis(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(
            LogKind::System {
                message: message.into(),
            },
            "System",
            false,
        )
    }
}

/// Public lobby view of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub user_count: usize,
    pub max_users: u32,
    pub has_password: bool,
}

/// Admin dashboard view of a room (includes hidden rooms)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRoomInfo {
    pub id: RoomId,
    pub name: String,
    pub user_count: usize,
    pub max_users: u32,
    pub is_hidden: bool,
    pub users: Vec<String>,
}

/// Admin dashboard view of a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserInfo {
    pub connection_id: ConnectionId,
    pub username: String,
    pub room_id: Option<RoomId>,
    pub room_name: String,
    pub ip_address: String,
    pub is_admin: bool,
}

/// Room details sent to a user right after joining
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub name: String,
    pub max_users: u32,
    pub current_users: usize,
    pub is_hidden: bool,
    pub created_by: String,
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Collapse loopback spellings so bans on `127.0.0.1` match IPv6 clients too
pub fn normalize_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V6(v6) if v6.is_loopback() => "127.0.0.1".to_string(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        IpAddr::V4(v4) => v4.to_string(),
    }
}
