//! Live WebSocket connections, addressable by id.
//!
//! # Design Decisions
//! - The connection task owns the socket; the registry only holds the
//!   connection's outbox, so a lookup after teardown finds nothing
//! - Queue and closing flag share one mutex; the task is woken through a
//!   `Notify` after every accepted push

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::net::connection::ConnectionId;
use crate::net::write_queue::{WriteItem, WriteQueue};
use crate::websocket::handle::{ConnectionHandle, SendError, WsOutbound};

/// Map of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    live: DashMap<ConnectionId, Arc<Outbox>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, id: ConnectionId, outbox: Arc<Outbox>) {
        self.live.insert(id, outbox);
    }

    pub(crate) fn remove(&self, id: ConnectionId) -> Option<Arc<Outbox>> {
        self.live.remove(&id).map(|(_, outbox)| outbox)
    }

    pub(crate) fn get(&self, id: ConnectionId) -> Option<Arc<Outbox>> {
        self.live.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Handles to every live connection, in no particular order.
    pub fn handles(self: &Arc<Self>) -> Vec<ConnectionHandle> {
        self.live
            .iter()
            .map(|entry| ConnectionHandle::new(*entry.key(), Arc::clone(self)))
            .collect()
    }
}

/// Outbound side of one connection, shared between its task and handles.
#[derive(Debug)]
pub(crate) struct Outbox {
    state: Mutex<OutboxState>,
    wake: Notify,
}

#[derive(Debug)]
struct OutboxState {
    queue: WriteQueue<WriteItem<WsOutbound>>,
    closing: bool,
}

impl Outbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(OutboxState {
                queue: WriteQueue::new(capacity),
                closing: false,
            }),
            wake: Notify::new(),
        }
    }

    pub(crate) fn push(&self, item: WriteItem<WsOutbound>) -> Result<(), SendError> {
        {
            let mut state = self.state.lock();
            if state.closing {
                return Err(SendError::Closed);
            }
            if !state.queue.enqueue(item) {
                return Err(SendError::QueueFull);
            }
        }
        self.wake.notify_one();
        Ok(())
    }

    pub(crate) fn take_next(&self) -> Option<WriteItem<WsOutbound>> {
        self.state.lock().queue.take_next()
    }

    pub(crate) fn on_write_complete(&self) -> bool {
        self.state.lock().queue.on_write_complete()
    }

    /// Resolves after a push; a push with nobody waiting is remembered.
    pub(crate) async fn notified(&self) {
        self.wake.notified().await
    }

    /// Flip the closing flag and drop queued items.
    ///
    /// Returns `true` only for the first caller.
    pub(crate) fn begin_close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closing {
            return false;
        }
        state.closing = true;
        state.queue.clear_pending();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn begin_close_wins_once_and_refuses_pushes() {
        let outbox = Outbox::new(4);
        assert!(outbox.push(WriteItem::new(WsOutbound::Text("x".into()))).is_ok());
        assert!(outbox.begin_close());
        assert!(!outbox.begin_close());
        assert!(outbox.take_next().is_none());
        assert_eq!(
            outbox.push(WriteItem::new(WsOutbound::Text("y".into()))),
            Err(SendError::Closed)
        );
    }

    #[tokio::test]
    async fn push_before_wait_is_not_lost() {
        let outbox = Outbox::new(4);
        outbox.push(WriteItem::new(WsOutbound::Close)).unwrap();
        tokio::time::timeout(Duration::from_secs(1), outbox.notified())
            .await
            .expect("stored wakeup");
    }

    #[test]
    fn registry_lookups() {
        let registry = Arc::new(ConnectionRegistry::new());
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        registry.insert(a, Arc::new(Outbox::new(1)));
        registry.insert(b, Arc::new(Outbox::new(1)));

        assert_eq!(registry.len(), 2);
        let mut ids: Vec<_> = registry.handles().iter().map(|h| h.id()).collect();
        ids.sort();
        assert_eq!(ids, vec![a, b]);

        assert!(registry.remove(a).is_some());
        assert!(registry.remove(a).is_none());
        assert!(!registry.contains(a));
        assert_eq!(registry.len(), 1);
    }
}
