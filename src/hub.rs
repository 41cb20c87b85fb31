//! Live socket registry. Each WebSocket task owns the receiving half of an
//! unbounded channel; the hub keeps the sending half keyed by connection id.

use crate::broadcast::Transport;
use crate::protocol::ServerEvent;
use crate::types::ConnectionId;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

/// What a socket task can be told to do
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Event(ServerEvent),
    Close,
}

#[derive(Debug, Default)]
pub struct ClientHub {
    senders: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Outgoing>>>,
}

impl ClientHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket and hand back its receiver
    pub async fn attach(&self, id: &ConnectionId) -> mpsc::UnboundedReceiver<Outgoing> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.write().await.insert(id.clone(), tx);
        rx
    }

    pub async fn detach(&self, id: &ConnectionId) {
        self.senders.write().await.remove(id);
    }

    pub async fn len(&self) -> usize {
        self.senders.read().await.len()
    }
}

#[async_trait]
impl Transport for ClientHub {
    async fn send_to_connection(&self, id: &ConnectionId, event: &ServerEvent) -> bool {
        match self.senders.read().await.get(id) {
            Some(tx) => tx.send(Outgoing::Event(event.clone())).is_ok(),
            None => false,
        }
    }

    /// Queue a close behind any pending events and forget the socket
    async fn close(&self, id: &ConnectionId) {
        if let Some(tx) = self.senders.write().await.remove(id) {
            let _ = tx.send(Outgoing::Close);
        }
    }
}
