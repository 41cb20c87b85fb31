//! Connection registry: every live link, its identity and current room.

use crate::error::{ChatError, ChatResult};
use crate::types::*;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    /// username -> most recently registered connection
    by_username: HashMap<String, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection.
    ///
    /// A second connection under the same username takes over the username
    /// index; the older connection stays registered but is no longer
    /// reachable by name.
    pub fn register(
        &mut self,
        id: ConnectionId,
        identity: &Identity,
        session_id: SessionId,
        ip: String,
    ) -> ChatResult<()> {
        if identity.username.trim().is_empty() {
            return Err(ChatError::Unauthenticated);
        }

        if let Some(previous) = self.by_username.get(&identity.username) {
            tracing::debug!(
                username = %identity.username,
                previous = %previous,
                "Username re-registered, newest connection wins the lookup"
            );
        }

        self.by_username
            .insert(identity.username.clone(), id.clone());
        self.connections.insert(
            id.clone(),
            Connection {
                id,
                username: identity.username.clone(),
                is_admin: identity.is_admin,
                session_id,
                ip,
                room: None,
            },
        );
        Ok(())
    }

    /// Remove a connection. Returns `None` if it was already gone.
    pub fn unregister(&mut self, id: &ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(id)?;
        if self.by_username.get(&connection.username) == Some(id) {
            self.by_username.remove(&connection.username);
        }
        Some(connection)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn lookup_by_username(&self, username: &str) -> Option<&ConnectionId> {
        self.by_username.get(username)
    }

    pub fn set_room(&mut self, id: &ConnectionId, room: Option<RoomId>) {
        if let Some(connection) = self.connections.get_mut(id) {
            connection.room = room;
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Connections that are not in any room
    pub fn lobby(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(|c| c.room.is_none())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
