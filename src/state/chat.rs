//! Connection lifecycle and room membership flows.
//!
//! `ChatCore` methods mutate state and fill an [`Outbox`] while the caller
//! holds the write lock. The `AppState` wrappers take the lock, run the flow,
//! release it, talk to the session store if needed, then deliver.

use super::{AppState, ChatCore};
use crate::broadcast::Outbox;
use crate::error::{ChatError, ChatResult};
use crate::protocol::ServerEvent;
use crate::types::*;

impl ChatCore {
    fn connection(&self, id: &ConnectionId) -> ChatResult<Connection> {
        self.registry
            .get(id)
            .cloned()
            .ok_or(ChatError::Unauthenticated)
    }

    pub fn connect(
        &mut self,
        out: &mut Outbox,
        id: ConnectionId,
        identity: &Identity,
        session_id: SessionId,
        ip: String,
    ) -> ChatResult<()> {
        self.registry.register(id, identity, session_id, ip)?;
        self.notify_admins(out);
        Ok(())
    }

    /// Tear down a connection. Runs at most once per connection; later calls
    /// return false and emit nothing.
    pub fn disconnect(&mut self, out: &mut Outbox, id: &ConnectionId) -> bool {
        if self.registry.get(id).is_none() {
            return false;
        }

        self.vacate(out, id, false);
        self.admin_watchers.remove(id);
        self.registry.unregister(id);

        self.notify_admins(out);
        self.notify_total_users(out);
        true
    }

    /// Send a final notice, close the socket, then clean up as a disconnect
    pub(crate) fn force_disconnect(
        &mut self,
        out: &mut Outbox,
        id: &ConnectionId,
        notice: ServerEvent,
    ) {
        out.to_connection(id, notice);
        out.close(id);
        self.disconnect(out, id);
    }

    pub fn join_lobby(&self, out: &mut Outbox, id: &ConnectionId) -> ChatResult<()> {
        self.connection(id)?;
        out.to_connection(id, self.room_list_event());
        Ok(())
    }

    pub fn create_room(
        &mut self,
        out: &mut Outbox,
        id: &ConnectionId,
        name: &str,
        capacity: u32,
        password: Option<&str>,
    ) -> ChatResult<RoomId> {
        let connection = self.connection(id)?;
        let room_id = self
            .rooms
            .create_room(name, capacity, password, &connection.username)?;

        tracing::info!(
            room_id = %room_id,
            creator = %connection.username,
            "Room created"
        );

        out.to_connection(
            id,
            ServerEvent::RoomCreated {
                room_id: room_id.clone(),
            },
        );
        self.notify_lobby_rooms(out);
        self.notify_admins(out);
        Ok(room_id)
    }

    /// Remove the connection from whatever room it is in and put it back in
    /// the lobby. Returns false if the connection was not in a room.
    pub(crate) fn leave_current_room(&mut self, out: &mut Outbox, id: &ConnectionId) -> bool {
        self.vacate(out, id, true)
    }

    /// Old room sees `userLeft` then `updateUserList`; the lobby then sees
    /// either the deletion of the emptied room or its new head count.
    ///
    /// With `to_lobby` false the connection keeps its old room pointer until
    /// the caller moves it, so it is not counted as a lobby watcher meanwhile.
    fn vacate(&mut self, out: &mut Outbox, id: &ConnectionId, to_lobby: bool) -> bool {
        let Some(room_id) = self.registry.get(id).and_then(|c| c.room.clone()) else {
            return false;
        };
        if to_lobby {
            self.registry.set_room(id, None);
        }

        // The room may have been deleted underneath us
        let Some(member) = self.rooms.remove_member(&room_id, id) else {
            return false;
        };

        let entry = LogEntry::new(LogKind::Leave, &member.username, member.is_admin);
        self.rooms.append_log(&room_id, entry.clone());
        self.notify_log_entry(out, &room_id, &entry);
        self.notify_user_list(out, &room_id);

        let now_empty = self.rooms.get(&room_id).is_some_and(|r| r.is_empty());
        if now_empty {
            self.rooms.remove(&room_id);
            tracing::info!(room_id = %room_id, "Deleted empty room");
            out.to_lobby(
                &self.registry,
                ServerEvent::RoomDeleted {
                    room_id: room_id.clone(),
                },
            );
        } else if let Some(room) = self.rooms.get(&room_id) {
            out.to_lobby(
                &self.registry,
                ServerEvent::RoomUserCountUpdate {
                    room_id: room_id.clone(),
                    user_count: room.member_count(),
                },
            );
        }
        true
    }

    /// Explicit leave back to the lobby. Idempotent.
    pub fn leave_room(&mut self, out: &mut Outbox, id: &ConnectionId) -> bool {
        if !self.leave_current_room(out, id) {
            return false;
        }
        out.to_connection(id, self.room_list_event());
        self.notify_admins(out);
        true
    }

    /// Join a room, moving out of the current one first.
    ///
    /// `has_grant` is whether the connection's session holds an access grant
    /// for this room.
    pub fn join_room(
        &mut self,
        out: &mut Outbox,
        id: &ConnectionId,
        room_id: &RoomId,
        has_grant: bool,
    ) -> ChatResult<()> {
        let connection = self.connection(id)?;
        let room = self.rooms.get(room_id).ok_or(ChatError::RoomNotFound)?;

        if connection.room.as_ref() == Some(room_id) && room.is_member(id) {
            // Already here: refresh the joiner's view only
            out.to_connection(
                id,
                ServerEvent::LoadLogs {
                    logs: room.log().cloned().collect(),
                },
            );
            out.to_connection(
                id,
                ServerEvent::UpdateUserList {
                    usernames: room.usernames(),
                },
            );
            out.to_connection(id, ServerEvent::RoomInfo(room.info()));
            return Ok(());
        }

        if room.has_password() && !has_grant && !connection.is_admin {
            return Err(ChatError::PasswordRequired);
        }

        if room.member_count() >= room.capacity as usize && !connection.is_admin {
            return Err(ChatError::RoomFull);
        }

        if self.bans.is_banned(&connection.username, &connection.ip) {
            tracing::warn!(
                username = %connection.username,
                ip = %connection.ip,
                "Banned user tried to join a room"
            );
            self.force_disconnect(out, id, ServerEvent::error(ChatError::Banned.to_string()));
            return Err(ChatError::Banned);
        }

        self.vacate(out, id, false);

        let member = Member {
            username: connection.username.clone(),
            is_admin: connection.is_admin,
        };
        if !self.rooms.add_member(room_id, id, member) {
            return Err(ChatError::RoomNotFound);
        }
        self.registry.set_room(id, Some(room_id.clone()));

        let Some(room) = self.rooms.get(room_id) else {
            return Err(ChatError::RoomNotFound);
        };
        out.to_connection(
            id,
            ServerEvent::LoadLogs {
                logs: room.log().cloned().collect(),
            },
        );

        let entry = LogEntry::new(LogKind::Join, &connection.username, connection.is_admin);
        self.rooms.append_log(room_id, entry.clone());
        self.notify_log_entry(out, room_id, &entry);
        self.notify_user_list(out, room_id);

        if let Some(room) = self.rooms.get(room_id) {
            out.to_connection(id, ServerEvent::RoomInfo(room.info()));
        }
        self.notify_admins(out);
        self.notify_lobby_rooms(out);

        tracing::info!(
            username = %connection.username,
            room_id = %room_id,
            "Joined room"
        );
        Ok(())
    }

    pub fn send_message(
        &mut self,
        out: &mut Outbox,
        id: &ConnectionId,
        message: &str,
    ) -> ChatResult<()> {
        let connection = self.connection(id)?;
        let room_id = connection.room.ok_or(ChatError::NotInRoom)?;
        if !self.rooms.contains(&room_id) {
            return Err(ChatError::RoomNotFound);
        }

        let text = message.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ChatError::MessageTooLong);
        }

        let entry = LogEntry::new(
            LogKind::Message {
                message: text.to_string(),
            },
            &connection.username,
            connection.is_admin,
        );
        self.rooms.append_log(&room_id, entry.clone());
        self.notify_log_entry(out, &room_id, &entry);
        Ok(())
    }

    /// Record an already-stored image in a room's log.
    ///
    /// The uploading session must have a live connection inside the room.
    pub fn post_image(
        &mut self,
        out: &mut Outbox,
        session_id: &str,
        room_id: &RoomId,
        url: &str,
    ) -> ChatResult<()> {
        let connection = self.member_for_session(session_id, room_id)?;
        let entry = LogEntry::new(
            LogKind::Image {
                url: url.to_string(),
            },
            &connection.username,
            connection.is_admin,
        );
        self.rooms.append_log(room_id, entry.clone());
        self.notify_log_entry(out, room_id, &entry);
        Ok(())
    }

    /// The session's connection that is currently a member of `room_id`
    pub(crate) fn member_for_session(
        &self,
        session_id: &str,
        room_id: &RoomId,
    ) -> ChatResult<Connection> {
        let room = self.rooms.get(room_id).ok_or(ChatError::RoomNotFound)?;
        self.registry
            .all()
            .find(|c| {
                c.session_id == session_id
                    && c.room.as_ref() == Some(room_id)
                    && room.is_member(&c.id)
            })
            .cloned()
            .ok_or(ChatError::NotInRoom)
    }

    pub fn update_room_settings(
        &mut self,
        out: &mut Outbox,
        id: &ConnectionId,
        room_id: &RoomId,
        new_name: &str,
        new_capacity: u32,
    ) -> ChatResult<()> {
        let connection = self.connection(id)?;
        let room = self.rooms.get(room_id).ok_or(ChatError::RoomNotFound)?;

        if !connection.is_admin {
            if connection.room.as_ref() != Some(room_id) {
                return Err(ChatError::NotInRoom);
            }
            if room.created_by != connection.username {
                tracing::warn!(
                    username = %connection.username,
                    room_id = %room_id,
                    "Non-creator tried to change room settings"
                );
                return Err(ChatError::PermissionDenied);
            }
        }

        let old_name = self
            .rooms
            .update_settings(room_id, new_name, new_capacity)?;
        let Some(room) = self.rooms.get(room_id) else {
            return Err(ChatError::RoomNotFound);
        };
        let (name, capacity, hidden) = (room.name.clone(), room.capacity, room.hidden);

        let actor = if connection.is_admin {
            format!("{} (Admin)", connection.username)
        } else {
            connection.username.clone()
        };
        // Full details go to the log, members only see who changed it
        self.rooms.append_log(
            room_id,
            LogEntry::system(format!(
                "Room settings updated by {}. Name: \"{}\" → \"{}\", Max users: {}",
                actor, old_name, name, capacity
            )),
        );
        let notice = LogEntry::system(format!("Room settings updated by {}", actor));

        self.notify_room(
            out,
            room_id,
            ServerEvent::RoomSettingsUpdated {
                success: true,
                room_name: Some(name.clone()),
                max_users: Some(capacity),
                message: None,
            },
        );
        self.notify_log_entry(out, room_id, &notice);
        self.notify_admins(out);
        if !hidden {
            if let Some(room) = self.rooms.get(room_id) {
                out.to_lobby(&self.registry, ServerEvent::RoomSettingsChanged(room.summary()));
            }
        }

        tracing::info!(room_id = %room_id, old_name = %old_name, new_name = %name, capacity, "Room settings updated");
        Ok(())
    }
}

impl AppState {
    /// Register a freshly upgraded socket
    pub async fn connect(
        &self,
        id: &ConnectionId,
        identity: &Identity,
        session_id: &SessionId,
        ip: &str,
    ) -> ChatResult<()> {
        let mut out = Outbox::new();
        let mut core = self.core.write().await;
        core.connect(
            &mut out,
            id.clone(),
            identity,
            session_id.clone(),
            ip.to_string(),
        )?;
        self.dispatch_after(core, out).await;
        Ok(())
    }

    /// Socket gone. Safe to call more than once.
    pub async fn disconnect(&self, id: &ConnectionId) -> bool {
        let mut out = Outbox::new();
        let mut core = self.core.write().await;
        let removed = core.disconnect(&mut out, id);
        self.dispatch_after(core, out).await;
        if let Some(guard) = &self.flood_guard {
            guard.forget(id).await;
        }
        removed
    }

    pub async fn join_lobby(&self, id: &ConnectionId) -> ChatResult<()> {
        let mut out = Outbox::new();
        let core = self.core.read().await;
        core.join_lobby(&mut out, id)?;
        self.dispatch_after(core, out).await;
        Ok(())
    }

    pub async fn create_room(
        &self,
        id: &ConnectionId,
        name: &str,
        capacity: u32,
        password: Option<&str>,
    ) -> ChatResult<RoomId> {
        let mut out = Outbox::new();
        let mut core = self.core.write().await;
        let room_id = core.create_room(&mut out, id, name, capacity, password)?;
        let session_id = core.registry.get(id).map(|c| c.session_id.clone());

        let turn = self.delivery.lock().await;
        drop(core);

        // Grant before the creator hears about the room, so their first join
        // already sees the grant
        if password.is_some_and(|p| !p.is_empty()) {
            if let Some(session_id) = session_id {
                self.sessions.grant_room_access(&session_id, &room_id).await;
            }
        }

        out.deliver(self.hub.as_ref()).await;
        drop(turn);
        Ok(room_id)
    }

    pub async fn join_room(&self, id: &ConnectionId, room_id: &RoomId) -> ChatResult<()> {
        let session_id = self
            .core
            .read()
            .await
            .registry
            .get(id)
            .map(|c| c.session_id.clone())
            .ok_or(ChatError::Unauthenticated)?;
        let has_grant = self.sessions.has_room_access(&session_id, room_id).await;

        let mut out = Outbox::new();
        let mut core = self.core.write().await;
        let result = core.join_room(&mut out, id, room_id, has_grant);
        // A ban still produces a notice and a close
        self.dispatch_after(core, out).await;
        result
    }

    /// Check a room password and grant the session access on success
    pub async fn submit_room_password(
        &self,
        id: &ConnectionId,
        room_id: &RoomId,
        password: &str,
    ) -> ChatResult<()> {
        let session_id = {
            let core = self.core.read().await;
            let connection = core.registry.get(id).ok_or(ChatError::Unauthenticated)?;
            if let Err(e) = core.rooms.check_password(room_id, password) {
                tracing::info!(username = %connection.username, room_id = %room_id, "Failed password attempt");
                return Err(e);
            }
            connection.session_id.clone()
        };

        self.sessions.grant_room_access(&session_id, room_id).await;

        let mut out = Outbox::new();
        out.to_connection(
            id,
            ServerEvent::RoomAccessGranted {
                room_id: room_id.clone(),
            },
        );
        self.dispatch(out).await;
        Ok(())
    }

    pub async fn leave_room(&self, id: &ConnectionId) -> bool {
        let mut out = Outbox::new();
        let mut core = self.core.write().await;
        let left = core.leave_room(&mut out, id);
        self.dispatch_after(core, out).await;
        left
    }

    pub async fn send_message(&self, id: &ConnectionId, message: &str) -> ChatResult<()> {
        let mut out = Outbox::new();
        let mut core = self.core.write().await;
        core.send_message(&mut out, id, message)?;
        self.dispatch_after(core, out).await;
        Ok(())
    }

    /// Post a stored image on behalf of the session's connection in the room
    pub async fn post_image(&self, session_id: &str, room_id: &RoomId, url: &str) -> ChatResult<()> {
        let mut out = Outbox::new();
        let mut core = self.core.write().await;
        core.post_image(&mut out, session_id, room_id, url)?;
        self.dispatch_after(core, out).await;
        Ok(())
    }

    pub async fn update_room_settings(
        &self,
        id: &ConnectionId,
        room_id: &RoomId,
        new_name: &str,
        new_capacity: u32,
    ) -> ChatResult<()> {
        let mut out = Outbox::new();
        let mut core = self.core.write().await;
        core.update_room_settings(&mut out, id, room_id, new_name, new_capacity)?;
        self.dispatch_after(core, out).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_with(users: &[(&str, &str)]) -> ChatCore {
        let mut core = ChatCore::default();
        let mut out = Outbox::new();
        for (id, name) in users {
            core.connect(
                &mut out,
                id.to_string(),
                &Identity::user(*name),
                format!("s-{}", id),
                format!("10.0.0.{}", id.len()),
            )
            .unwrap();
        }
        core
    }

    fn id(s: &str) -> ConnectionId {
        s.to_string()
    }

    fn user_list(out: &Outbox, conn: &str) -> Option<Vec<String>> {
        out.events_for(&id(conn))
            .into_iter()
            .rev()
            .find_map(|e| match e {
                ServerEvent::UpdateUserList { usernames } => Some(usernames.clone()),
                _ => None,
            })
    }

    fn rooms_containing(core: &ChatCore, conn: &str) -> usize {
        core.rooms.iter().filter(|r| r.is_member(&id(conn))).count()
    }

    #[test]
    fn test_capacity_scenario() {
        let mut core = core_with(&[("a", "A"), ("b", "B"), ("c", "C")]);
        let mut out = Outbox::new();
        let room = core
            .create_room(&mut out, &id("a"), "Lobby Chat", 2, None)
            .unwrap();

        let mut out = Outbox::new();
        core.join_room(&mut out, &id("a"), &room, false).unwrap();
        assert_eq!(user_list(&out, "a"), Some(vec!["A".to_string()]));

        let mut out = Outbox::new();
        core.join_room(&mut out, &id("b"), &room, false).unwrap();
        assert_eq!(
            user_list(&out, "a"),
            Some(vec!["A".to_string(), "B".to_string()])
        );

        let mut out = Outbox::new();
        assert_eq!(
            core.join_room(&mut out, &id("c"), &room, false),
            Err(ChatError::RoomFull)
        );

        let mut out = Outbox::new();
        assert!(core.disconnect(&mut out, &id("a")));
        assert_eq!(core.rooms.get(&room).unwrap().usernames(), vec!["B"]);
        assert_eq!(user_list(&out, "b"), Some(vec!["B".to_string()]));

        let mut out = Outbox::new();
        assert!(core.disconnect(&mut out, &id("b")));
        assert!(core.rooms.get(&room).is_none());
        assert!(core.rooms.list_public().is_empty());

        // The lobby hears about the deletion
        assert!(out
            .events_for(&id("c"))
            .iter()
            .any(|e| matches!(e, ServerEvent::RoomDeleted { room_id } if *room_id == room)));

        let mut out = Outbox::new();
        assert_eq!(
            core.join_room(&mut out, &id("c"), &room, false),
            Err(ChatError::RoomNotFound)
        );
    }

    #[test]
    fn test_admin_bypasses_capacity_and_password() {
        let mut core = core_with(&[("a", "A")]);
        let mut out = Outbox::new();
        core.connect(
            &mut out,
            id("root"),
            &Identity::admin("admin"),
            "s-root".to_string(),
            "10.0.0.9".to_string(),
        )
        .unwrap();

        let room = core
            .create_room(&mut out, &id("a"), "Tiny Room", 1, Some("pw"))
            .unwrap();
        core.join_room(&mut out, &id("a"), &room, true).unwrap();
        core.join_room(&mut out, &id("root"), &room, false).unwrap();
        assert_eq!(core.rooms.get(&room).unwrap().member_count(), 2);
    }

    #[test]
    fn test_password_required_without_grant() {
        let mut core = core_with(&[("x", "X"), ("y", "Y")]);
        let mut out = Outbox::new();
        let room = core
            .create_room(&mut out, &id("x"), "Secret Room", 5, Some("secret"))
            .unwrap();

        assert_eq!(
            core.join_room(&mut out, &id("y"), &room, false),
            Err(ChatError::PasswordRequired)
        );
        assert!(core.join_room(&mut out, &id("y"), &room, true).is_ok());
    }

    #[test]
    fn test_transfer_orders_leave_before_join() {
        let mut core = core_with(&[("a", "A"), ("b", "B"), ("w", "Watcher")]);
        let mut out = Outbox::new();
        let first = core
            .create_room(&mut out, &id("a"), "First Room", 5, None)
            .unwrap();
        let second = core
            .create_room(&mut out, &id("a"), "Second Room", 5, None)
            .unwrap();
        core.join_room(&mut out, &id("a"), &first, false).unwrap();
        core.join_room(&mut out, &id("b"), &first, false).unwrap();

        let mut out = Outbox::new();
        core.join_room(&mut out, &id("a"), &second, false).unwrap();

        // b stays in the first room and sees A leave, then the refreshed list
        let b_events: Vec<_> = out
            .events_for(&id("b"))
            .into_iter()
            .map(|e| e.name())
            .collect();
        assert_eq!(b_events, vec!["userLeft", "updateUserList"]);

        let a_events: Vec<_> = out
            .events_for(&id("a"))
            .into_iter()
            .map(|e| e.name())
            .collect();
        assert_eq!(
            a_events,
            vec!["loadLogs", "userJoined", "updateUserList", "roomInfo"]
        );

        assert_eq!(rooms_containing(&core, "a"), 1);
        assert_eq!(core.registry.get(&id("a")).unwrap().room, Some(second));
    }

    #[test]
    fn test_transfer_out_of_last_seat_deletes_old_room() {
        let mut core = core_with(&[("a", "A")]);
        let mut out = Outbox::new();
        let first = core
            .create_room(&mut out, &id("a"), "First Room", 5, None)
            .unwrap();
        let second = core
            .create_room(&mut out, &id("a"), "Second Room", 5, None)
            .unwrap();
        core.join_room(&mut out, &id("a"), &first, false).unwrap();
        core.join_room(&mut out, &id("a"), &second, false).unwrap();

        assert!(core.rooms.get(&first).is_none());
        assert!(core.rooms.get(&second).is_some());
    }

    #[test]
    fn test_rapid_rejoins_keep_single_membership() {
        let mut core = core_with(&[("a", "A"), ("b", "B"), ("c", "C")]);
        let mut out = Outbox::new();
        let r1 = core
            .create_room(&mut out, &id("b"), "Room One", 5, None)
            .unwrap();
        let r2 = core
            .create_room(&mut out, &id("c"), "Room Two", 5, None)
            .unwrap();
        core.join_room(&mut out, &id("b"), &r1, false).unwrap();
        core.join_room(&mut out, &id("c"), &r2, false).unwrap();

        for i in 0..20 {
            let target = if i % 2 == 0 { &r1 } else { &r2 };
            core.join_room(&mut out, &id("a"), target, false).unwrap();
            core.join_room(&mut out, &id("a"), target, false).unwrap();
            assert_eq!(rooms_containing(&core, "a"), 1);
            assert_eq!(core.registry.get(&id("a")).unwrap().room.as_ref(), Some(target));
        }
        assert_eq!(core.rooms.get(&r1).unwrap().usernames(), vec!["B"]);
        assert_eq!(core.rooms.get(&r2).unwrap().usernames(), vec!["C", "A"]);
    }

    #[test]
    fn test_rejoin_same_room_does_not_duplicate() {
        let mut core = core_with(&[("a", "A")]);
        let mut out = Outbox::new();
        let room = core
            .create_room(&mut out, &id("a"), "Lounge", 5, None)
            .unwrap();
        core.join_room(&mut out, &id("a"), &room, false).unwrap();

        let mut out = Outbox::new();
        core.join_room(&mut out, &id("a"), &room, false).unwrap();
        assert_eq!(core.rooms.get(&room).unwrap().usernames(), vec!["A"]);
        assert!(!out
            .events_for(&id("a"))
            .iter()
            .any(|e| matches!(e, ServerEvent::UserJoined { .. })));
    }

    #[test]
    fn test_leave_is_idempotent() {
        let mut core = core_with(&[("a", "A"), ("b", "B")]);
        let mut out = Outbox::new();
        let room = core
            .create_room(&mut out, &id("a"), "Lounge", 5, None)
            .unwrap();
        core.join_room(&mut out, &id("a"), &room, false).unwrap();
        core.join_room(&mut out, &id("b"), &room, false).unwrap();

        assert!(core.leave_room(&mut out, &id("a")));
        let mut out = Outbox::new();
        assert!(!core.leave_room(&mut out, &id("a")));
        assert!(out.is_empty());
        assert_eq!(core.rooms.get(&room).unwrap().usernames(), vec!["B"]);
    }

    #[test]
    fn test_disconnect_runs_once() {
        let mut core = core_with(&[("a", "A"), ("b", "B")]);
        let mut out = Outbox::new();
        let room = core
            .create_room(&mut out, &id("a"), "Lounge", 5, None)
            .unwrap();
        core.join_room(&mut out, &id("a"), &room, false).unwrap();
        core.join_room(&mut out, &id("b"), &room, false).unwrap();

        let mut out = Outbox::new();
        assert!(core.disconnect(&mut out, &id("a")));
        let left_count = out
            .events_for(&id("b"))
            .iter()
            .filter(|e| matches!(e, ServerEvent::UserLeft { .. }))
            .count();
        assert_eq!(left_count, 1);

        let mut out = Outbox::new();
        assert!(!core.disconnect(&mut out, &id("a")));
        assert!(out.is_empty());

        // A join racing in after the disconnect is rejected
        assert_eq!(
            core.join_room(&mut out, &id("a"), &room, false),
            Err(ChatError::Unauthenticated)
        );
    }

    #[test]
    fn test_banned_join_forces_disconnect() {
        let mut core = core_with(&[("a", "A"), ("m", "mallory")]);
        core.bans.insert("mallory");
        let mut out = Outbox::new();
        let room = core
            .create_room(&mut out, &id("a"), "Lounge", 5, None)
            .unwrap();

        let mut out = Outbox::new();
        assert_eq!(
            core.join_room(&mut out, &id("m"), &room, false),
            Err(ChatError::Banned)
        );
        assert!(out.closes(&id("m")));
        assert!(core.registry.get(&id("m")).is_none());
        assert!(matches!(
            out.events_for(&id("m")).first(),
            Some(ServerEvent::ErrorMsg { .. })
        ));
    }

    #[test]
    fn test_message_validation() {
        let mut core = core_with(&[("a", "A")]);
        let mut out = Outbox::new();
        assert_eq!(
            core.send_message(&mut out, &id("a"), "hello"),
            Err(ChatError::NotInRoom)
        );

        let room = core
            .create_room(&mut out, &id("a"), "Lounge", 5, None)
            .unwrap();
        core.join_room(&mut out, &id("a"), &room, false).unwrap();

        assert_eq!(
            core.send_message(&mut out, &id("a"), "   "),
            Err(ChatError::EmptyMessage)
        );
        assert_eq!(
            core.send_message(&mut out, &id("a"), &"x".repeat(501)),
            Err(ChatError::MessageTooLong)
        );

        let mut out = Outbox::new();
        core.send_message(&mut out, &id("a"), "  hi there  ").unwrap();
        assert!(matches!(
            out.events_for(&id("a")).as_slice(),
            [ServerEvent::NewMessage { message, .. }] if message == "hi there"
        ));
    }

    #[test]
    fn test_settings_update_rules() {
        let mut core = core_with(&[("x", "X"), ("y", "Y")]);
        let mut out = Outbox::new();
        let room = core
            .create_room(&mut out, &id("x"), "Lounge", 5, None)
            .unwrap();
        core.join_room(&mut out, &id("x"), &room, false).unwrap();
        core.join_room(&mut out, &id("y"), &room, false).unwrap();

        assert_eq!(
            core.update_room_settings(&mut out, &id("y"), &room, "Hijacked", 5),
            Err(ChatError::PermissionDenied)
        );
        assert_eq!(
            core.update_room_settings(&mut out, &id("x"), &room, "Lounge", 1),
            Err(ChatError::CapacityBelowOccupancy {
                capacity: 1,
                occupancy: 2
            })
        );
        assert_eq!(
            core.update_room_settings(&mut out, &id("x"), &room, "no", 5),
            Err(ChatError::InvalidName)
        );
        let unchanged = core.rooms.get(&room).unwrap();
        assert_eq!((unchanged.name.as_str(), unchanged.capacity), ("Lounge", 5));

        let mut out = Outbox::new();
        core.update_room_settings(&mut out, &id("x"), &room, "Renamed", 3)
            .unwrap();
        let updated = core.rooms.get(&room).unwrap();
        assert_eq!((updated.name.as_str(), updated.capacity), ("Renamed", 3));
        assert!(matches!(
            out.events_for(&id("y")).first(),
            Some(ServerEvent::RoomSettingsUpdated { success: true, .. })
        ));
    }

    #[test]
    fn test_image_post_requires_membership() {
        let mut core = core_with(&[("a", "A"), ("b", "B")]);
        let mut out = Outbox::new();
        assert_eq!(
            core.post_image(&mut out, "s-a", &id("missing"), "/uploads/x.png"),
            Err(ChatError::RoomNotFound)
        );

        let room = core
            .create_room(&mut out, &id("a"), "Gallery", 5, Some("pw"))
            .unwrap();
        core.join_room(&mut out, &id("a"), &room, true).unwrap();

        // b has a live session but never joined
        assert_eq!(
            core.post_image(&mut out, "s-b", &room, "/uploads/x.png"),
            Err(ChatError::NotInRoom)
        );

        let mut out = Outbox::new();
        core.post_image(&mut out, "s-a", &room, "/uploads/x.png")
            .unwrap();
        assert!(matches!(
            out.events_for(&id("a")).as_slice(),
            [ServerEvent::NewImage { username, url, .. }] if username == "A" && url == "/uploads/x.png"
        ));
    }

    #[test]
    fn test_settings_notice_is_short_but_log_is_detailed() {
        let mut core = core_with(&[("x", "X")]);
        let mut out = Outbox::new();
        let room = core
            .create_room(&mut out, &id("x"), "Lounge", 5, None)
            .unwrap();
        core.join_room(&mut out, &id("x"), &room, false).unwrap();

        let mut out = Outbox::new();
        core.update_room_settings(&mut out, &id("x"), &room, "Renamed", 4)
            .unwrap();
        assert!(out.events_for(&id("x")).iter().any(|e| matches!(
            e,
            ServerEvent::NewMessage { message, .. } if message == "Room settings updated by X"
        )));

        let last = core.rooms.get(&room).unwrap().log().last().cloned().unwrap();
        assert!(matches!(
            last.kind,
            LogKind::System { message } if message.contains("\"Lounge\" → \"Renamed\"") && message.contains("Max users: 4")
        ));
    }
}
