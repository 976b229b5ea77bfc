//! Connection registry: authenticated identity → live channel.
//!
//! At most one live channel per identity; registering again for the same
//! identity silently supersedes the previous entry. Ephemeral by design,
//! rebuilt from scratch on restart when clients re-authenticate.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::ServerFrame;

struct Entry {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<ServerFrame>,
}

/// All operations take the single lock, so a broadcast enumeration never
/// observes a half-updated map.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<String, Entry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an identity to a channel, superseding any previous channel for
    /// the same identity.
    pub fn register(&self, user_id: &str, conn_id: Uuid, tx: mpsc::UnboundedSender<ServerFrame>) {
        self.inner
            .lock()
            .insert(user_id.to_string(), Entry { conn_id, tx });
    }

    /// Remove the identity's entry, but only if it still belongs to the
    /// given connection. A superseded channel's teardown must not evict the
    /// connection that replaced it.
    pub fn unregister(&self, user_id: &str, conn_id: Uuid) {
        let mut map = self.inner.lock();
        if map.get(user_id).is_some_and(|e| e.conn_id == conn_id) {
            map.remove(user_id);
        }
    }

    /// Best-effort delivery. Returns false if the identity has no live
    /// channel; a channel whose receiver is gone is cleaned up on the spot.
    pub fn send_to(&self, user_id: &str, frame: ServerFrame) -> bool {
        let mut map = self.inner.lock();
        match map.get(user_id) {
            Some(entry) => {
                if entry.tx.send(frame).is_ok() {
                    true
                } else {
                    map.remove(user_id);
                    false
                }
            }
            None => false,
        }
    }

    pub fn is_registered(&self, user_id: &str) -> bool {
        self.inner.lock().contains_key(user_id)
    }

    pub fn registered_ids(&self) -> Vec<String> {
        self.inner.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
