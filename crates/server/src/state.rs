//! Application state shared across request handlers and connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hubbub_shared::{RoomKey, ServerEvent, WsEnvelope};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::config::ServerConfig;

const CHANNEL_CAPACITY: usize = 100;

/// An event on its way to subscribers.
#[derive(Debug, Clone)]
pub struct Relay {
    /// Connection that caused the event; it is not echoed back there.
    pub origin: Option<Uuid>,
    pub envelope: WsEnvelope<ServerEvent>,
}

impl Relay {
    pub fn from_server(event: ServerEvent) -> Self {
        Self {
            origin: None,
            envelope: WsEnvelope::new(event),
        }
    }

    pub fn from_connection(origin: Uuid, event: ServerEvent) -> Self {
        Self {
            origin: Some(origin),
            envelope: WsEnvelope::new(event),
        }
    }

    pub fn is_echo_for(&self, conn_id: Uuid) -> bool {
        self.origin == Some(conn_id)
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    auth_token: Option<Arc<str>>,
    /// Per-room pub/sub channels, created on first join and dropped once
    /// the last member leaves.
    rooms: Arc<RwLock<HashMap<RoomKey, broadcast::Sender<Relay>>>>,
    /// Every authenticated connection listens here.
    lobby: broadcast::Sender<Relay>,
    connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            auth_token: config.auth_token.as_deref().map(Arc::from),
            rooms: Arc::new(RwLock::new(HashMap::new())),
            lobby: broadcast::channel(CHANNEL_CAPACITY).0,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Whether `presented` satisfies the configured token.
    pub fn token_matches(&self, presented: Option<&str>) -> bool {
        match &self.auth_token {
            None => true,
            Some(expected) => presented == Some(&**expected),
        }
    }

    /// Subscribe to `room`, creating its channel if needed.
    ///
    /// Subscription happens under the map lock so [`release_room`](Self::release_room)
    /// cannot drop the channel between lookup and subscribe.
    pub async fn subscribe_room(&self, room: &RoomKey) -> broadcast::Receiver<Relay> {
        {
            let rooms = self.rooms.read().await;
            if let Some(sender) = rooms.get(room) {
                return sender.subscribe();
            }
        }

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drop the channel for `room` if nobody listens any more. Returns
    /// whether it was removed.
    pub async fn release_room(&self, room: &RoomKey) -> bool {
        let mut rooms = self.rooms.write().await;
        match rooms.get(room) {
            Some(sender) if sender.receiver_count() == 0 => {
                rooms.remove(room);
                tracing::debug!("Room {} has no members left, dropped", room);
                true
            }
            _ => false,
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Publish to `room`. Returns how many connections will receive it.
    pub async fn publish(&self, room: &RoomKey, relay: Relay) -> usize {
        let sender = self.rooms.read().await.get(room).cloned();
        match sender {
            Some(sender) => sender.send(relay).unwrap_or(0),
            None => 0,
        }
    }

    /// Publish to every authenticated connection.
    pub fn broadcast(&self, relay: Relay) -> usize {
        self.lobby.send(relay).unwrap_or(0)
    }

    pub fn subscribe_lobby(&self) -> broadcast::Receiver<Relay> {
        self.lobby.subscribe()
    }

    pub fn connection_opened(&self) -> usize {
        self.connections.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn connection_closed(&self) -> usize {
        self.connections.fetch_sub(1, Ordering::SeqCst).saturating_sub(1)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}
