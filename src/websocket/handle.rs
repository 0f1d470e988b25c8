//! Application-facing reference to a WebSocket connection.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use thiserror::Error;

use crate::net::connection::ConnectionId;
use crate::net::write_queue::WriteItem;
use crate::observability::metrics;
use crate::websocket::registry::ConnectionRegistry;

/// Lifecycle events reported to the connection-state handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Outbound WebSocket work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsOutbound {
    Text(String),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("connection is closed")]
    Closed,

    #[error("write queue is full")]
    QueueFull,
}

/// A weak reference to a live connection: an id plus the registry.
///
/// Holding a handle never keeps the socket open. Once the connection is
/// torn down every operation reports [`SendError::Closed`].
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
}

impl ConnectionHandle {
    pub(crate) fn new(id: ConnectionId, registry: Arc<ConnectionRegistry>) -> Self {
        Self { id, registry }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.registry.contains(self.id)
    }

    /// Queue a text message. Never blocks; a full queue is the caller's to
    /// retry or drop.
    pub fn send(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.push(WriteItem::new(WsOutbound::Text(text.into())))
    }

    /// Queue a close frame; the connection tears down once it is written.
    pub fn close(&self) -> Result<(), SendError> {
        self.push(WriteItem::closing(WsOutbound::Close))
    }

    fn push(&self, item: WriteItem<WsOutbound>) -> Result<(), SendError> {
        let outbox = self.registry.get(self.id).ok_or(SendError::Closed)?;
        let result = outbox.push(item);
        if result == Err(SendError::QueueFull) {
            metrics::record_queue_full("websocket");
            tracing::debug!(connection_id = %self.id, "WebSocket write queue full");
        }
        result
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl Hash for ConnectionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}
