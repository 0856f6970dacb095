//! Which user is reachable on which live connection.
//!
//! One entry per user; a newer connection replaces the older one. The
//! registry owns only the mapping; the socket belongs to its connection task.
//!
//! Replacing an entry drops the previous [`ConnectionHandle`], the only
//! long-lived sender of that connection's event channel (dispatch holds clones
//! just for the length of a send). Once the channel closes the
//! replaced connection's send loop ends and its socket is closed, so a user
//! never has two live sockets. [`SessionRegistry::clear`] closes every
//! connection the same way at shutdown.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use notecast_types::events::NoteEvent;

/// Outbound side of one WebSocket connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub conn_id: Uuid,
    tx: mpsc::UnboundedSender<NoteEvent>,
}

impl ConnectionHandle {
    /// A fresh handle plus the receiver the connection task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NoteEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            conn_id: Uuid::new_v4(),
            tx,
        };
        (handle, rx)
    }

    /// Queue an event for the socket. False once the connection is gone.
    pub fn send(&self, event: NoteEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    entries: Arc<DashMap<Uuid, ConnectionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `user_id` to `handle`, returning the handle it replaced.
    pub fn register(&self, user_id: Uuid, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let replaced = self.entries.insert(user_id, handle);
        if let Some(old) = &replaced {
            debug!("User {} reconnected, replacing connection {}", user_id, old.conn_id);
        }
        replaced
    }

    pub fn unregister(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.entries.remove(&user_id).map(|(_, handle)| handle)
    }

    /// Remove the entry only if it still points at `conn_id`, so a late
    /// disconnect of a replaced connection leaves the newer one in place.
    pub fn unregister_connection(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        self.entries
            .remove_if(&user_id, |_, handle| handle.conn_id == conn_id)
            .is_some()
    }

    pub fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.entries.get(&user_id).map(|entry| entry.value().clone())
    }

    /// Drop every entry. Each connection loop ends once its sender is gone.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Unregisters its connection when dropped, whichever way the task exits.
pub struct RegistrationGuard {
    registry: SessionRegistry,
    user_id: Uuid,
    conn_id: Uuid,
}

impl RegistrationGuard {
    pub fn new(registry: SessionRegistry, user_id: Uuid, conn_id: Uuid) -> Self {
        Self {
            registry,
            user_id,
            conn_id,
        }
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.unregister_connection(self.user_id, self.conn_id);
    }
}
