use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::capabilities::DocState;
use super::connctx::ConnHandle;
use super::docctx::DocKey;
use super::error::CrdtError;

/// A connection as seen by its room.
pub(crate) struct Member {
    pub conn: ConnHandle,
    /// Set when a frame had to be dropped for this peer; the next delivery
    /// is replaced by a full snapshot.
    pub needs_resync: bool,
}

/// Everything a room owns. Only reachable through [`Room::lock`], so the
/// CRDT handle, member set, dirty flag and timer are mutated serially.
pub(crate) struct RoomInner {
    pub state: Box<dyn DocState>,
    pub members: HashMap<Uuid, Member>,
    pub dirty: bool,
    /// Bumped on every applied update; a flush only clears `dirty` if no
    /// update landed while its save was in flight.
    pub version: u64,
    pub last_flush: Option<DateTime<Utc>>,
    pub flush_timer: Option<JoinHandle<()>>,
    /// Set once the room has been torn down and removed from the registry.
    pub closed: bool,
}

impl RoomInner {
    pub fn cancel_flush_timer(&mut self) {
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
    }
}

/// In-memory collaboration unit for one document.
pub struct Room {
    key: DocKey,
    inner: Mutex<RoomInner>,
    /// Serializes saves of this room. Taken before the room lock, never
    /// while holding it.
    flush: Mutex<()>,
}

impl Room {
    pub(crate) fn new(key: DocKey, state: Box<dyn DocState>) -> Self {
        Self {
            key,
            inner: Mutex::new(RoomInner {
                state,
                members: HashMap::new(),
                dirty: false,
                version: 0,
                last_flush: None,
                flush_timer: None,
                closed: false,
            }),
            flush: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &DocKey {
        &self.key
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, RoomInner> {
        self.inner.lock().await
    }

    pub(crate) async fn flush_guard(&self) -> MutexGuard<'_, ()> {
        self.flush.lock().await
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.members.len()
    }

    pub async fn is_dirty(&self) -> bool {
        self.inner.lock().await.dirty
    }

    pub async fn last_flush(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().await.last_flush
    }

    /// Current merged state of the document.
    pub async fn snapshot(&self) -> Result<Vec<u8>, CrdtError> {
        self.inner.lock().await.state.full_state()
    }
}

impl Drop for RoomInner {
    fn drop(&mut self) {
        self.cancel_flush_timer();
    }
}
