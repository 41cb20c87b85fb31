//! Room table: the authoritative map of rooms, their members and logs.

use crate::auth::constant_time_eq;
use crate::error::{ChatError, ChatResult};
use crate::types::*;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};

/// Salted SHA-256 of a room password
#[derive(Debug, Clone)]
struct PasswordHash {
    salt: String,
    digest: String,
}

impl PasswordHash {
    fn new(password: &str) -> Self {
        let salt: [u8; 16] = rand::rng().random();
        let salt = hex::encode(salt);
        let digest = Self::digest(&salt, password);
        Self { salt, digest }
    }

    fn digest(salt: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn verify(&self, candidate: &str) -> bool {
        let digest = Self::digest(&self.salt, candidate);
        constant_time_eq(digest.as_bytes(), self.digest.as_bytes())
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub capacity: u32,
    password: Option<PasswordHash>,
    pub created_by: String,
    pub created_at: i64,
    pub hidden: bool,
    log: VecDeque<LogEntry>,
    /// Members in join order
    members: Vec<(ConnectionId, Member)>,
}

impl Room {
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_member(&self, connection_id: &ConnectionId) -> bool {
        self.members.iter().any(|(id, _)| id == connection_id)
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &ConnectionId> {
        self.members.iter().map(|(id, _)| id)
    }

    pub fn usernames(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|(_, m)| m.username.clone())
            .collect()
    }

    pub fn log(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter()
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            user_count: self.members.len(),
            max_users: self.capacity,
            has_password: self.has_password(),
        }
    }

    pub fn admin_info(&self) -> AdminRoomInfo {
        AdminRoomInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            user_count: self.members.len(),
            max_users: self.capacity,
            is_hidden: self.hidden,
            users: self.usernames(),
        }
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            name: self.name.clone(),
            max_users: self.capacity,
            current_users: self.members.len(),
            is_hidden: self.hidden,
            created_by: self.created_by.clone(),
        }
    }

    fn push_log(&mut self, entry: LogEntry) {
        self.log.push_back(entry);
        while self.log.len() > MAX_LOG_ENTRIES {
            self.log.pop_front();
        }
    }
}

/// Trim and length-check a room name
pub fn validate_room_name(name: &str) -> ChatResult<String> {
    let name = name.trim();
    let len = name.chars().count();
    if !(ROOM_NAME_MIN_CHARS..=ROOM_NAME_MAX_CHARS).contains(&len) {
        return Err(ChatError::InvalidName);
    }
    Ok(name.to_string())
}

pub fn validate_capacity(capacity: u32) -> ChatResult<u32> {
    if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
        return Err(ChatError::InvalidCapacity);
    }
    Ok(capacity)
}

#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<RoomId, Room>,
    /// Insertion order, used for stable listings
    order: Vec<RoomId>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room and return its id. An empty password means no password.
    pub fn create_room(
        &mut self,
        name: &str,
        capacity: u32,
        password: Option<&str>,
        creator: &str,
    ) -> ChatResult<RoomId> {
        let name = validate_room_name(name)?;
        let capacity = validate_capacity(capacity)?;

        let id = loop {
            let candidate = ulid::Ulid::new().to_string();
            if !self.rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        let mut room = Room {
            id: id.clone(),
            name,
            capacity,
            password: password.filter(|p| !p.is_empty()).map(PasswordHash::new),
            created_by: creator.to_string(),
            created_at: now_millis(),
            hidden: false,
            log: VecDeque::new(),
            members: Vec::new(),
        };
        room.push_log(LogEntry::system(format!("Room created by {}", creator)));

        self.rooms.insert(id.clone(), room);
        self.order.push(id.clone());
        Ok(id)
    }

    pub fn get(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn contains(&self, id: &RoomId) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Add a member without any admission checks. Returns false if the room
    /// does not exist.
    pub fn add_member(&mut self, id: &RoomId, connection_id: &ConnectionId, member: Member) -> bool {
        let Some(room) = self.rooms.get_mut(id) else {
            return false;
        };
        if !room.is_member(connection_id) {
            room.members.push((connection_id.clone(), member));
        }
        true
    }

    pub fn remove_member(&mut self, id: &RoomId, connection_id: &ConnectionId) -> Option<Member> {
        let room = self.rooms.get_mut(id)?;
        let index = room.members.iter().position(|(c, _)| c == connection_id)?;
        Some(room.members.remove(index).1)
    }

    pub fn remove(&mut self, id: &RoomId) -> Option<Room> {
        let room = self.rooms.remove(id)?;
        self.order.retain(|r| r != id);
        Some(room)
    }

    /// Rename and resize a room in place. Returns the previous name.
    pub fn update_settings(
        &mut self,
        id: &RoomId,
        new_name: &str,
        new_capacity: u32,
    ) -> ChatResult<String> {
        let name = validate_room_name(new_name)?;
        let capacity = validate_capacity(new_capacity)?;
        let room = self.rooms.get_mut(id).ok_or(ChatError::RoomNotFound)?;

        if (capacity as usize) < room.members.len() {
            return Err(ChatError::CapacityBelowOccupancy {
                capacity,
                occupancy: room.members.len(),
            });
        }

        let old_name = std::mem::replace(&mut room.name, name);
        room.capacity = capacity;
        Ok(old_name)
    }

    /// Flip the hidden flag, returning the new value
    pub fn toggle_hidden(&mut self, id: &RoomId) -> ChatResult<bool> {
        let room = self.rooms.get_mut(id).ok_or(ChatError::RoomNotFound)?;
        room.hidden = !room.hidden;
        Ok(room.hidden)
    }

    pub fn append_log(&mut self, id: &RoomId, entry: LogEntry) {
        if let Some(room) = self.rooms.get_mut(id) {
            room.push_log(entry);
        }
    }

    pub fn check_password(&self, id: &RoomId, candidate: &str) -> ChatResult<()> {
        let room = self.rooms.get(id).ok_or(ChatError::RoomNotFound)?;
        match &room.password {
            Some(hash) if !hash.verify(candidate) => Err(ChatError::IncorrectPassword),
            _ => Ok(()),
        }
    }

    pub fn logs(&self, id: &RoomId) -> Option<Vec<LogEntry>> {
        self.rooms.get(id).map(|r| r.log.iter().cloned().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.order.iter().filter_map(|id| self.rooms.get(id))
    }

    /// Lobby listing: visible rooms in insertion order
    pub fn list_public(&self) -> Vec<RoomSummary> {
        self.iter()
            .filter(|r| !r.hidden)
            .map(Room::summary)
            .collect()
    }

    pub fn list_all(&self) -> Vec<AdminRoomInfo> {
        self.iter().map(Room::admin_info).collect()
    }
}
