use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};
use toonify_core::types::Timestamp;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

pub struct WsConnection {
    pub sender: WsSender,
    pub connected_at: Timestamp,
}

/// Registry of connected browser clients, keyed by connection id.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection and return the receiver its writer task drains.
    pub async fn add(&self, conn_id: String) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    pub async fn remove(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().await.remove(conn_id) {
            let secs = (chrono::Utc::now() - conn.connected_at).num_seconds();
            tracing::debug!(conn_id = %conn_id, connected_secs = secs, "WebSocket connection removed");
        }
    }

    /// Send to one connection. Returns `false` if it is gone.
    pub async fn send_to(&self, conn_id: &str, message: Message) -> bool {
        self.connections
            .read()
            .await
            .get(conn_id)
            .is_some_and(|conn| conn.sender.send(message).is_ok())
    }

    /// Send to every connection, dropping those whose writer has exited.
    /// Returns the number still connected.
    pub async fn broadcast(&self, message: Message) -> usize {
        self.send_all(|| message.clone()).await
    }

    /// Ping every connection. Returns the number still connected.
    pub async fn ping_all(&self) -> usize {
        self.send_all(|| Message::Ping(Bytes::new())).await
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then forget them all.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    async fn send_all(&self, make: impl Fn() -> Message) -> usize {
        let mut conns = self.connections.write().await;
        conns.retain(|conn_id, conn| {
            let open = conn.sender.send(make()).is_ok();
            if !open {
                tracing::debug!(conn_id = %conn_id, "Pruning closed WebSocket connection");
            }
            open
        });
        conns.len()
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
