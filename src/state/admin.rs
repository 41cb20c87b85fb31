//! Admin actions: dashboard subscription, kick, ban, room deletion and hiding.

use super::{AppState, ChatCore};
use crate::broadcast::Outbox;
use crate::error::{ChatError, ChatResult};
use crate::protocol::ServerEvent;
use crate::types::*;
use std::collections::BTreeSet;

const KICK_REASON: &str = "You have been kicked by an admin.";

/// How an admin names the user they want to act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminTarget {
    Connection(ConnectionId),
    Username(String),
}

impl AdminTarget {
    /// Prefer the connection id when both are given
    pub fn from_parts(
        connection_id: Option<ConnectionId>,
        username: Option<String>,
    ) -> ChatResult<Self> {
        match (connection_id, username) {
            (Some(id), _) if !id.is_empty() => Ok(Self::Connection(id)),
            (_, Some(name)) if !name.is_empty() => Ok(Self::Username(name)),
            _ => Err(ChatError::TargetNotFound),
        }
    }
}

impl ChatCore {
    pub(crate) fn require_admin(&self, id: &ConnectionId) -> ChatResult<Connection> {
        let connection = self
            .registry
            .get(id)
            .ok_or(ChatError::Unauthenticated)?;
        if !connection.is_admin {
            tracing::warn!(
                connection = %id,
                username = %connection.username,
                "Non-admin attempted an admin action"
            );
            return Err(ChatError::PermissionDenied);
        }
        Ok(connection.clone())
    }

    fn resolve_target(&self, target: &AdminTarget) -> ChatResult<Connection> {
        let id = match target {
            AdminTarget::Connection(id) => id,
            AdminTarget::Username(name) => self
                .registry
                .lookup_by_username(name)
                .ok_or(ChatError::TargetNotFound)?,
        };
        let connection = self.registry.get(id).ok_or(ChatError::TargetNotFound)?;
        if connection.is_admin {
            return Err(ChatError::CannotTargetAdmin);
        }
        Ok(connection.clone())
    }

    pub fn admin_subscribe(&mut self, out: &mut Outbox, id: &ConnectionId) -> ChatResult<()> {
        self.require_admin(id)?;
        self.admin_watchers.insert(id.clone());
        out.to_connection(id, self.admin_snapshot());
        Ok(())
    }

    /// Returns the kicked username
    pub fn kick(
        &mut self,
        out: &mut Outbox,
        actor: &ConnectionId,
        target: &AdminTarget,
    ) -> ChatResult<String> {
        let admin = self.require_admin(actor)?;
        let victim = self.resolve_target(target)?;

        tracing::info!(
            admin = %admin.username,
            username = %victim.username,
            connection = %victim.id,
            "Kicking user"
        );
        self.force_disconnect(
            out,
            &victim.id,
            ServerEvent::Kicked {
                reason: KICK_REASON.to_string(),
            },
        );
        Ok(victim.username)
    }

    /// Ban a connected user by username, IP or both, then disconnect them.
    ///
    /// Returns the full ban set for the caller to persist. Fails with
    /// `NoChange` if nothing was selected or everything selected was already
    /// banned; in that case the target stays connected.
    pub fn ban(
        &mut self,
        out: &mut Outbox,
        actor: &ConnectionId,
        target: &AdminTarget,
        ban_username: bool,
        ban_ip: bool,
    ) -> ChatResult<BTreeSet<String>> {
        let admin = self.require_admin(actor)?;
        if !ban_username && !ban_ip {
            return Err(ChatError::NoChange);
        }
        // A banned username is already disconnected, so it no longer resolves.
        if let AdminTarget::Username(name) = target {
            if ban_username && !ban_ip && self.bans.contains(name) {
                return Err(ChatError::NoChange);
            }
        }
        let victim = self.resolve_target(target)?;

        let mut banned_value = None;
        if ban_username && self.bans.insert(&victim.username) {
            banned_value = Some(victim.username.clone());
        }
        if ban_ip && self.bans.insert(&victim.ip) {
            banned_value = Some(victim.ip.clone());
        }
        let Some(value) = banned_value else {
            return Err(ChatError::NoChange);
        };

        tracing::info!(
            admin = %admin.username,
            username = %victim.username,
            ip = %victim.ip,
            value = %value,
            "Banning user"
        );
        self.force_disconnect(
            out,
            &victim.id,
            ServerEvent::Banned {
                reason: format!("You have been banned ({}).", value),
            },
        );
        Ok(self.bans.snapshot())
    }

    /// Delete a room outright. Every member, including an admin inside it, is
    /// disconnected.
    pub fn delete_room(
        &mut self,
        out: &mut Outbox,
        actor: &ConnectionId,
        room_id: &RoomId,
    ) -> ChatResult<()> {
        let admin = self.require_admin(actor)?;
        let room = self.rooms.get(room_id).ok_or(ChatError::RoomNotFound)?;
        let members: Vec<ConnectionId> = room.member_ids().cloned().collect();

        out.to_room(
            room,
            ServerEvent::RoomDeleted {
                room_id: room_id.clone(),
            },
        );
        for member in &members {
            out.close(member);
            self.admin_watchers.remove(member);
            self.registry.unregister(member);
        }
        self.rooms.remove(room_id);

        tracing::info!(
            admin = %admin.username,
            room_id = %room_id,
            members = members.len(),
            "Room deleted by admin"
        );

        out.to_lobby(
            &self.registry,
            ServerEvent::RoomDeleted {
                room_id: room_id.clone(),
            },
        );
        self.notify_admins(out);
        self.notify_total_users(out);
        Ok(())
    }

    /// Returns the new hidden flag
    pub fn toggle_hidden(
        &mut self,
        out: &mut Outbox,
        actor: &ConnectionId,
        room_id: &RoomId,
    ) -> ChatResult<bool> {
        let admin = self.require_admin(actor)?;
        let hidden = self.rooms.toggle_hidden(room_id)?;

        if hidden {
            out.to_lobby(
                &self.registry,
                ServerEvent::RoomHidden {
                    room_id: room_id.clone(),
                },
            );
        } else if let Some(room) = self.rooms.get(room_id) {
            out.to_lobby(&self.registry, ServerEvent::RoomShown(room.summary()));
        }
        self.notify_admins(out);

        tracing::info!(admin = %admin.username, room_id = %room_id, hidden, "Room visibility changed");
        Ok(hidden)
    }
}

impl AppState {
    pub async fn admin_subscribe(&self, id: &ConnectionId) -> ChatResult<()> {
        let mut out = Outbox::new();
        let mut core = self.core.write().await;
        core.admin_subscribe(&mut out, id)?;
        self.dispatch_after(core, out).await;
        Ok(())
    }

    pub async fn kick(&self, actor: &ConnectionId, target: &AdminTarget) -> ChatResult<String> {
        let mut out = Outbox::new();
        let mut core = self.core.write().await;
        let username = core.kick(&mut out, actor, target)?;
        self.dispatch_after(core, out).await;
        Ok(username)
    }

    /// Ban, notify, then persist. A failed save is logged and the in-memory
    /// ban stays in force.
    pub async fn ban(
        &self,
        actor: &ConnectionId,
        target: &AdminTarget,
        ban_username: bool,
        ban_ip: bool,
    ) -> ChatResult<()> {
        let mut out = Outbox::new();
        let mut core = self.core.write().await;
        let snapshot = core.ban(&mut out, actor, target, ban_username, ban_ip)?;
        self.dispatch_after(core, out).await;

        if let Err(e) = self.ban_store.save(&snapshot).await {
            tracing::error!(error = %e, "Failed to persist ban list");
        }
        Ok(())
    }

    pub async fn delete_room(&self, actor: &ConnectionId, room_id: &RoomId) -> ChatResult<()> {
        let mut out = Outbox::new();
        let mut core = self.core.write().await;
        core.delete_room(&mut out, actor, room_id)?;
        self.dispatch_after(core, out).await;
        Ok(())
    }

    pub async fn toggle_hidden(&self, actor: &ConnectionId, room_id: &RoomId) -> ChatResult<bool> {
        let mut out = Outbox::new();
        let mut core = self.core.write().await;
        let hidden = core.toggle_hidden(&mut out, actor, room_id)?;
        self.dispatch_after(core, out).await;
        Ok(hidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use crate::storage::{BanStore, MemoryBanStore, MemoryImageStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn id(s: &str) -> ConnectionId {
        s.to_string()
    }

    /// Admin "root", users "a" (alice, 10.0.0.1) and "b" (bob, 10.0.0.2)
    fn setup() -> ChatCore {
        let mut core = ChatCore::default();
        let mut out = Outbox::new();
        core.connect(
            &mut out,
            id("root"),
            &Identity::admin("admin"),
            "s-root".to_string(),
            "127.0.0.1".to_string(),
        )
        .unwrap();
        core.connect(
            &mut out,
            id("a"),
            &Identity::user("alice"),
            "s-a".to_string(),
            "10.0.0.1".to_string(),
        )
        .unwrap();
        core.connect(
            &mut out,
            id("b"),
            &Identity::user("bob"),
            "s-b".to_string(),
            "10.0.0.2".to_string(),
        )
        .unwrap();
        core
    }

    #[test]
    fn test_target_from_parts() {
        assert_eq!(
            AdminTarget::from_parts(Some(id("c1")), Some("bob".into())),
            Ok(AdminTarget::Connection(id("c1")))
        );
        assert_eq!(
            AdminTarget::from_parts(None, Some("bob".into())),
            Ok(AdminTarget::Username("bob".into()))
        );
        assert_eq!(
            AdminTarget::from_parts(Some(String::new()), None),
            Err(ChatError::TargetNotFound)
        );
    }

    #[test]
    fn test_non_admin_is_rejected() {
        let mut core = setup();
        let mut out = Outbox::new();
        assert_eq!(
            core.kick(&mut out, &id("a"), &AdminTarget::Connection(id("b"))),
            Err(ChatError::PermissionDenied)
        );
        assert_eq!(
            core.admin_subscribe(&mut out, &id("a")),
            Err(ChatError::PermissionDenied)
        );
        assert!(core.registry.get(&id("b")).is_some());
    }

    #[test]
    fn test_admin_cannot_be_targeted() {
        let mut core = setup();
        let mut out = Outbox::new();
        assert_eq!(
            core.kick(&mut out, &id("root"), &AdminTarget::Connection(id("root"))),
            Err(ChatError::CannotTargetAdmin)
        );
    }

    #[test]
    fn test_kick_by_username_disconnects() {
        let mut core = setup();
        let mut out = Outbox::new();
        let room = core
            .create_room(&mut out, &id("a"), "Lounge", 5, None)
            .unwrap();
        core.join_room(&mut out, &id("a"), &room, false).unwrap();
        core.join_room(&mut out, &id("b"), &room, false).unwrap();

        let mut out = Outbox::new();
        let name = core
            .kick(&mut out, &id("root"), &AdminTarget::Username("bob".into()))
            .unwrap();
        assert_eq!(name, "bob");
        assert!(matches!(
            out.events_for(&id("b")).first(),
            Some(ServerEvent::Kicked { .. })
        ));
        assert!(out.closes(&id("b")));
        assert!(core.registry.get(&id("b")).is_none());
        assert_eq!(core.rooms.get(&room).unwrap().usernames(), vec!["alice"]);
    }

    #[test]
    fn test_ban_scenario() {
        let mut core = setup();
        let mut out = Outbox::new();
        core.admin_subscribe(&mut out, &id("root")).unwrap();

        let mut out = Outbox::new();
        let snapshot = core
            .ban(
                &mut out,
                &id("root"),
                &AdminTarget::Connection(id("a")),
                true,
                false,
            )
            .unwrap();
        assert!(snapshot.contains("alice"));
        assert!(core.bans.contains("alice"));
        assert!(core.registry.get(&id("a")).is_none());
        assert!(out.closes(&id("a")));
        assert!(matches!(
            out.events_for(&id("a")).first(),
            Some(ServerEvent::Banned { reason }) if reason == "You have been banned (alice)."
        ));
        // Dashboard sees the updated ban list
        assert!(out.events_for(&id("root")).iter().any(|e| matches!(
            e,
            ServerEvent::AdminUpdate { bans, .. } if bans == &vec!["alice".to_string()]
        )));
    }

    #[test]
    fn test_ban_both_reports_ip() {
        let mut core = setup();
        let mut out = Outbox::new();
        core.ban(
            &mut out,
            &id("root"),
            &AdminTarget::Connection(id("b")),
            true,
            true,
        )
        .unwrap();
        assert!(core.bans.is_banned("bob", "x"));
        assert!(core.bans.is_banned("x", "10.0.0.2"));
        assert!(matches!(
            out.events_for(&id("b")).first(),
            Some(ServerEvent::Banned { reason }) if reason.contains("10.0.0.2")
        ));
    }

    #[test]
    fn test_ban_without_change_keeps_target() {
        let mut core = setup();
        let mut out = Outbox::new();
        assert_eq!(
            core.ban(
                &mut out,
                &id("root"),
                &AdminTarget::Connection(id("a")),
                false,
                false
            ),
            Err(ChatError::NoChange)
        );
        core.bans.insert("alice");
        assert_eq!(
            core.ban(
                &mut out,
                &id("root"),
                &AdminTarget::Connection(id("a")),
                true,
                false
            ),
            Err(ChatError::NoChange)
        );
        assert!(core.registry.get(&id("a")).is_some());
        assert!(out.is_empty());
    }

    #[test]
    fn test_delete_room_disconnects_members() {
        let mut core = setup();
        let mut out = Outbox::new();
        let room = core
            .create_room(&mut out, &id("a"), "Doomed Room", 5, None)
            .unwrap();
        core.join_room(&mut out, &id("a"), &room, false).unwrap();
        core.join_room(&mut out, &id("root"), &room, false).unwrap();

        let mut out = Outbox::new();
        core.delete_room(&mut out, &id("root"), &room).unwrap();

        assert!(core.rooms.get(&room).is_none());
        assert!(core.registry.get(&id("a")).is_none());
        assert!(core.registry.get(&id("root")).is_none());
        assert!(out.closes(&id("a")));
        assert!(out.closes(&id("root")));
        // bob was in the lobby
        assert!(out
            .events_for(&id("b"))
            .iter()
            .any(|e| matches!(e, ServerEvent::RoomDeleted { room_id } if *room_id == room)));
        assert_eq!(core.registry.len(), 1);
    }

    #[test]
    fn test_toggle_hidden_round_trip() {
        let mut core = setup();
        let mut out = Outbox::new();
        let room = core
            .create_room(&mut out, &id("a"), "Quiet Room", 5, None)
            .unwrap();
        core.join_room(&mut out, &id("a"), &room, false).unwrap();

        let mut out = Outbox::new();
        assert!(core.toggle_hidden(&mut out, &id("root"), &room).unwrap());
        assert!(core.rooms.list_public().is_empty());
        assert_eq!(core.rooms.list_all().len(), 1);
        assert!(matches!(
            out.events_for(&id("b")).as_slice(),
            [ServerEvent::RoomHidden { .. }]
        ));

        let mut out = Outbox::new();
        assert!(!core.toggle_hidden(&mut out, &id("root"), &room).unwrap());
        assert_eq!(core.rooms.list_public().len(), 1);
        assert!(matches!(
            out.events_for(&id("b")).as_slice(),
            [ServerEvent::RoomShown(summary)] if summary.id == room
        ));

        assert_eq!(
            core.toggle_hidden(&mut out, &id("root"), &id("missing")),
            Err(ChatError::RoomNotFound)
        );
    }

    #[tokio::test]
    async fn test_ban_is_persisted() {
        let ban_store = Arc::new(MemoryBanStore::default());
        let state = AppState::with_collaborators(
            Arc::new(MemorySessionStore::new(Duration::from_secs(60))),
            ban_store.clone(),
            Arc::new(MemoryImageStore::default()),
            BTreeSet::new(),
        );
        state
            .connect(&id("root"), &Identity::admin("admin"), &id("s1"), "127.0.0.1")
            .await
            .unwrap();
        state
            .connect(&id("m"), &Identity::user("mallory"), &id("s2"), "10.0.0.5")
            .await
            .unwrap();

        state
            .ban(&id("root"), &AdminTarget::Username("mallory".into()), false, true)
            .await
            .unwrap();

        let saved = ban_store.load().await.unwrap();
        assert!(saved.contains("10.0.0.5"));
        assert!(state.is_banned("someone", "10.0.0.5").await);
    }

    #[test]
    fn test_repeat_username_ban_reports_no_change() {
        let mut core = setup();
        let mut out = Outbox::new();
        let target = AdminTarget::Username("bob".into());
        core.ban(&mut out, &id("root"), &target, true, false).unwrap();
        assert!(core.registry.get(&id("b")).is_none());

        let mut out = Outbox::new();
        assert_eq!(
            core.ban(&mut out, &id("root"), &target, true, false),
            Err(ChatError::NoChange)
        );
        assert!(out.is_empty());
        // An IP ban still needs a live connection to read the address from
        assert_eq!(
            core.ban(&mut out, &id("root"), &target, true, true),
            Err(ChatError::TargetNotFound)
        );
    }

    #[tokio::test]
    async fn test_banning_mallory_twice_by_username() {
        let ban_store = Arc::new(MemoryBanStore::default());
        let state = AppState::with_collaborators(
            Arc::new(MemorySessionStore::new(Duration::from_secs(60))),
            ban_store.clone(),
            Arc::new(MemoryImageStore::default()),
            BTreeSet::new(),
        );
        state
            .connect(&id("root"), &Identity::admin("admin"), &id("s1"), "127.0.0.1")
            .await
            .unwrap();
        state
            .connect(&id("m"), &Identity::user("mallory"), &id("s2"), "10.0.0.5")
            .await
            .unwrap();

        let target = AdminTarget::Username("mallory".into());
        state.ban(&id("root"), &target, true, false).await.unwrap();
        assert_eq!(
            state.ban(&id("root"), &target, true, false).await,
            Err(ChatError::NoChange)
        );
        assert!(ban_store.load().await.unwrap().contains("mallory"));
    }
}
