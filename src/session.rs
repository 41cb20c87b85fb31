//! Login sessions and per-session room access grants

use crate::types::{Identity, RoomId, SessionId};
use async_trait::async_trait;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Start a session and return its id
    async fn create(&self, identity: Identity) -> SessionId;

    /// Identity behind a live session
    async fn get(&self, session_id: &str) -> Option<Identity>;

    async fn remove(&self, session_id: &str);

    /// Remember that this session passed a room's password check
    async fn grant_room_access(&self, session_id: &str, room_id: &RoomId);

    async fn has_room_access(&self, session_id: &str, room_id: &RoomId) -> bool;

    /// Drop expired sessions, returning how many were removed
    async fn purge_expired(&self) -> usize;
}

#[derive(Debug, Clone)]
struct SessionRecord {
    identity: Identity,
    expires_at: Instant,
    rooms: HashSet<RoomId>,
}

/// Sessions held in process memory with a fixed time-to-live
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
    ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn new_session_id() -> SessionId {
        let bytes: [u8; 32] = rand::rng().random();
        hex::encode(bytes)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, identity: Identity) -> SessionId {
        let mut sessions = self.sessions.write().await;
        let id = loop {
            let candidate = Self::new_session_id();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        sessions.insert(
            id.clone(),
            SessionRecord {
                identity,
                expires_at: Instant::now() + self.ttl,
                rooms: HashSet::new(),
            },
        );
        id
    }

    async fn get(&self, session_id: &str) -> Option<Identity> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|s| s.expires_at > Instant::now())
            .map(|s| s.identity.clone())
    }

    async fn remove(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    async fn grant_room_access(&self, session_id: &str, room_id: &RoomId) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.rooms.insert(room_id.clone());
        }
    }

    async fn has_room_access(&self, session_id: &str, room_id: &RoomId) -> bool {
        self.sessions
            .read()
            .await
            .get(session_id)
            .is_some_and(|s| s.expires_at > Instant::now() && s.rooms.contains(room_id))
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }
}

/// Background task that purges expired sessions
pub fn spawn_session_sweeper(
    store: Arc<dyn SessionStore>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = store.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "Purged expired sessions");
            }
        }
    })
}
