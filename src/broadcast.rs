//! Broadcast router
//!
//! Mutations never talk to sockets directly. While holding the state lock they
//! append envelopes to an [`Outbox`], resolving each audience to concrete
//! connection ids at the moment of emission. Once the lock is released the
//! outbox is delivered in order, one event per recipient per envelope.

use crate::protocol::ServerEvent;
use crate::state::registry::ConnectionRegistry;
use crate::state::rooms::Room;
use crate::state::ChatCore;
use crate::types::*;
use async_trait::async_trait;
use std::collections::HashSet;

/// Who an envelope was addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Connection(ConnectionId),
    Room(RoomId),
    Lobby,
    Admins,
}

#[derive(Debug, Clone)]
pub enum Envelope {
    Event {
        audience: Audience,
        recipients: Vec<ConnectionId>,
        event: ServerEvent,
    },
    /// Force the connection's socket closed after everything queued before it
    Close { connection: ConnectionId },
}

/// Socket-facing side of delivery
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns false if the connection has no live socket
    async fn send_to_connection(&self, id: &ConnectionId, event: &ServerEvent) -> bool;

    async fn close(&self, id: &ConnectionId);
}

#[derive(Debug, Default)]
pub struct Outbox {
    envelopes: Vec<Envelope>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, audience: Audience, recipients: Vec<ConnectionId>, event: ServerEvent) {
        if recipients.is_empty() {
            tracing::trace!(event = event.name(), ?audience, "No recipients");
            return;
        }
        self.envelopes.push(Envelope::Event {
            audience,
            recipients,
            event,
        });
    }

    pub fn to_connection(&mut self, id: &ConnectionId, event: ServerEvent) {
        self.push(Audience::Connection(id.clone()), vec![id.clone()], event);
    }

    pub fn to_room(&mut self, room: &Room, event: ServerEvent) {
        let recipients = room.member_ids().cloned().collect();
        self.push(Audience::Room(room.id.clone()), recipients, event);
    }

    pub fn to_lobby(&mut self, registry: &ConnectionRegistry, event: ServerEvent) {
        let recipients = registry.lobby().map(|c| c.id.clone()).collect();
        self.push(Audience::Lobby, recipients, event);
    }

    pub fn to_admins(&mut self, watchers: &HashSet<ConnectionId>, event: ServerEvent) {
        let mut recipients: Vec<_> = watchers.iter().cloned().collect();
        recipients.sort();
        self.push(Audience::Admins, recipients, event);
    }

    pub fn close(&mut self, id: &ConnectionId) {
        self.envelopes.push(Envelope::Close {
            connection: id.clone(),
        });
    }

    pub fn envelopes(&self) -> &[Envelope] {
        &self.envelopes
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    /// Events a single connection will receive, in delivery order
    pub fn events_for(&self, id: &ConnectionId) -> Vec<&ServerEvent> {
        self.envelopes
            .iter()
            .filter_map(|e| match e {
                Envelope::Event {
                    recipients, event, ..
                } if recipients.contains(id) => Some(event),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self, id: &ConnectionId) -> bool {
        self.envelopes
            .iter()
            .any(|e| matches!(e, Envelope::Close { connection } if connection == id))
    }

    /// Deliver everything in emission order. Must be called without the
    /// state lock held.
    pub async fn deliver(self, transport: &dyn Transport) {
        for envelope in self.envelopes {
            match envelope {
                Envelope::Event {
                    audience,
                    recipients,
                    event,
                } => {
                    tracing::trace!(
                        event = event.name(),
                        ?audience,
                        recipients = recipients.len(),
                        "Delivering"
                    );
                    for id in &recipients {
                        if !transport.send_to_connection(id, &event).await {
                            tracing::debug!(connection = %id, event = event.name(), "Recipient already gone");
                        }
                    }
                }
                Envelope::Close { connection } => transport.close(&connection).await,
            }
        }
    }
}

/// Fan-out helpers shared by the chat and admin flows
impl ChatCore {
    pub fn room_list_event(&self) -> ServerEvent {
        ServerEvent::RoomListUpdate {
            rooms: self.rooms.list_public(),
            connected_users: self.registry.len(),
        }
    }

    pub fn admin_snapshot(&self) -> ServerEvent {
        let users = self
            .registry
            .all()
            .map(|c| {
                let room_name = c
                    .room
                    .as_ref()
                    .and_then(|id| self.rooms.get(id))
                    .map(|r| r.name.clone())
                    .unwrap_or_else(|| LOBBY_LABEL.to_string());
                AdminUserInfo {
                    connection_id: c.id.clone(),
                    username: c.username.clone(),
                    room_id: c.room.clone(),
                    room_name,
                    ip_address: c.ip.clone(),
                    is_admin: c.is_admin,
                }
            })
            .collect();

        ServerEvent::AdminUpdate {
            users,
            rooms: self.rooms.list_all(),
            bans: self.bans.to_vec(),
        }
    }

    /// Dashboard refresh; skipped entirely while nobody is watching
    pub(crate) fn notify_admins(&self, out: &mut Outbox) {
        if self.admin_watchers.is_empty() {
            return;
        }
        out.to_admins(&self.admin_watchers, self.admin_snapshot());
    }

    pub(crate) fn notify_lobby_rooms(&self, out: &mut Outbox) {
        out.to_lobby(&self.registry, self.room_list_event());
    }

    /// Send an event to a room's current members, if the room still exists
    pub(crate) fn notify_room(&self, out: &mut Outbox, room_id: &RoomId, event: ServerEvent) {
        if let Some(room) = self.rooms.get(room_id) {
            out.to_room(room, event);
        }
    }

    pub(crate) fn notify_user_list(&self, out: &mut Outbox, room_id: &RoomId) {
        if let Some(room) = self.rooms.get(room_id) {
            out.to_room(
                room,
                ServerEvent::UpdateUserList {
                    usernames: room.usernames(),
                },
            );
        }
    }

    /// Broadcast a freshly appended log entry to its room
    pub(crate) fn notify_log_entry(&self, out: &mut Outbox, room_id: &RoomId, entry: &LogEntry) {
        if let Some(event) = ServerEvent::from_log(entry) {
            self.notify_room(out, room_id, event);
        }
    }

    pub(crate) fn notify_total_users(&self, out: &mut Outbox) {
        out.to_lobby(
            &self.registry,
            ServerEvent::TotalUserUpdate {
                connected_users: self.registry.len(),
            },
        );
    }
}
