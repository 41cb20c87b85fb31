pub mod access;
pub mod admin;
pub mod bans;
pub mod chat;
pub mod registry;
pub mod rooms;

use crate::abuse::FloodGuard;
use crate::auth::AdminCredentials;
use crate::broadcast::Outbox;
use crate::hub::ClientHub;
use crate::session::{MemorySessionStore, SessionStore};
use crate::storage::{BanStore, ImageStore, MemoryBanStore, MemoryImageStore};
use crate::types::*;
use bans::BanList;
use registry::ConnectionRegistry;
use rooms::RoomTable;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// All mutable chat state. Only ever touched through the lock in [`AppState`].
#[derive(Debug, Default)]
pub struct ChatCore {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) rooms: RoomTable,
    pub(crate) bans: BanList,
    /// Admins subscribed to live dashboard updates
    pub(crate) admin_watchers: HashSet<ConnectionId>,
}

impl ChatCore {
    pub fn new(bans: BTreeSet<String>) -> Self {
        Self {
            bans: BanList::new(bans),
            ..Self::default()
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomTable {
        &self.rooms
    }

    pub fn bans(&self) -> &BanList {
        &self.bans
    }

    pub fn is_admin_watcher(&self, id: &ConnectionId) -> bool {
        self.admin_watchers.contains(id)
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<RwLock<ChatCore>>,
    /// Live sockets, one channel per connection
    pub hub: Arc<ClientHub>,
    pub sessions: Arc<dyn SessionStore>,
    pub ban_store: Arc<dyn BanStore>,
    pub images: Arc<dyn ImageStore>,
    pub flood_guard: Option<FloodGuard>,
    pub admin_credentials: AdminCredentials,
    /// Held from just before the state lock is released until the outbox is
    /// delivered, so deliveries happen in mutation order
    delivery: Arc<Mutex<()>>,
}

impl AppState {
    /// Fully in-memory state with no flood guard
    pub fn new() -> Self {
        Self::with_collaborators(
            Arc::new(MemorySessionStore::new(Duration::from_secs(24 * 60 * 60))),
            Arc::new(MemoryBanStore::default()),
            Arc::new(MemoryImageStore::default()),
            BTreeSet::new(),
        )
    }

    pub fn with_collaborators(
        sessions: Arc<dyn SessionStore>,
        ban_store: Arc<dyn BanStore>,
        images: Arc<dyn ImageStore>,
        bans: BTreeSet<String>,
    ) -> Self {
        Self {
            core: Arc::new(RwLock::new(ChatCore::new(bans))),
            hub: Arc::new(ClientHub::new()),
            sessions,
            ban_store,
            images,
            flood_guard: None,
            admin_credentials: AdminCredentials::new("admin", "password"),
            delivery: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_flood_guard(mut self, guard: Option<FloodGuard>) -> Self {
        self.flood_guard = guard;
        self
    }

    pub fn with_admin_credentials(mut self, credentials: AdminCredentials) -> Self {
        self.admin_credentials = credentials;
        self
    }

    /// Deliver an outbox that was built without the state lock
    pub(crate) async fn dispatch(&self, out: Outbox) {
        let _turn = self.delivery.lock().await;
        out.deliver(self.hub.as_ref()).await;
    }

    /// Deliver an outbox built under `guard`. The delivery turn is taken
    /// before the guard is released, so no later mutation can deliver first.
    pub(crate) async fn dispatch_after<G: Send>(&self, guard: G, out: Outbox) {
        let _turn = self.delivery.lock().await;
        drop(guard);
        out.deliver(self.hub.as_ref()).await;
    }

    /// Public room listing for the lobby
    pub async fn list_public(&self) -> Vec<RoomSummary> {
        self.core.read().await.rooms.list_public()
    }

    pub async fn room_log(&self, room_id: &RoomId) -> Option<(String, Vec<LogEntry>)> {
        let core = self.core.read().await;
        let room = core.rooms.get(room_id)?;
        Some((room.name.clone(), room.log().cloned().collect()))
    }

    pub async fn is_banned(&self, username: &str, ip: &str) -> bool {
        self.core.read().await.bans.is_banned(username, ip)
    }

    pub async fn connected_users(&self) -> usize {
        self.core.read().await.registry.len()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
