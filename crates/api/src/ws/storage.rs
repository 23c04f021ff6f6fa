use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::stream::SplitSink;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Tracks all active WebSocket connections by socket id, plus which
/// sockets have joined which rooms. A user can hold several connections
/// (multiple tabs/devices), each with its own socket id.
pub struct WsStorage {
    connections: DashMap<String, WsSender>,
    rooms: DashMap<String, Vec<String>>,
}

impl WsStorage {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    pub fn add(&self, socket_id: String, sender: WsSender) {
        self.connections.insert(socket_id, sender);
    }

    /// Drops the connection and leaves every room it had joined.
    pub fn remove(&self, socket_id: &str) {
        self.connections.remove(socket_id);
        self.rooms.retain(|_, sockets| {
            sockets.retain(|s| s != socket_id);
            !sockets.is_empty()
        });
    }

    pub fn join_room(&self, room: &str, socket_id: &str) {
        let mut sockets = self.rooms.entry(room.to_string()).or_default();
        if !sockets.iter().any(|s| s == socket_id) {
            sockets.push(socket_id.to_string());
        }
    }

    pub fn leave_room(&self, room: &str, socket_id: &str) {
        if let Some(mut sockets) = self.rooms.get_mut(room) {
            sockets.retain(|s| s != socket_id);
            if sockets.is_empty() {
                drop(sockets);
                self.rooms.remove(room);
            }
        }
    }

    pub fn get_sender(&self, socket_id: &str) -> Option<WsSender> {
        self.connections.get(socket_id).map(|s| s.clone())
    }

    /// Senders for every socket in a room, minus the excluded one.
    pub fn room_senders(&self, room: &str, exclude_socket: Option<&str>) -> Vec<WsSender> {
        let socket_ids: Vec<String> = match self.rooms.get(room) {
            Some(sockets) => sockets
                .iter()
                .filter(|s| exclude_socket != Some(s.as_str()))
                .cloned()
                .collect(),
            None => return Vec::new(),
        };

        socket_ids
            .iter()
            .filter_map(|s| self.get_sender(s))
            .collect()
    }
}

impl Default for WsStorage {
    fn default() -> Self {
        Self::new()
    }
}
