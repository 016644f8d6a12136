use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, warn};

use super::capabilities::{DocEngine, DocStorage, PresenceStore};
use super::connctx::{ConnHandle, Enqueue};
use super::docctx::DocKey;
use super::error::{RelayError, StorageError};
use super::presence;
use super::room::{Member, Room};
use crate::config::SlowConsumerPolicy;

/// Tunables of the relay core.
#[derive(Clone, Debug)]
pub struct RelaySettings {
    /// Quiet period after the last update before a room is flushed.
    pub debounce: Duration,
    /// Interval of the liveness sweep.
    pub heartbeat: Duration,
    /// Frames buffered per peer before the slow-consumer policy kicks in.
    pub outbound_capacity: usize,
    pub slow_consumer: SlowConsumerPolicy,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2_000),
            heartbeat: Duration::from_secs(30),
            outbound_capacity: 256,
            slow_consumer: SlowConsumerPolicy::Drop,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub rooms: usize,
    pub connections: usize,
    pub dirty_rooms: usize,
}

type RoomSlot = Arc<OnceCell<Arc<Room>>>;

pub(crate) struct RegistryInner {
    pub rooms: Mutex<HashMap<DocKey, RoomSlot>>,
    pub engine: Arc<dyn DocEngine>,
    pub storage: Arc<dyn DocStorage>,
    pub presence: Arc<dyn PresenceStore>,
    pub settings: RelaySettings,
}

/// Owner of every live room, keyed by document.
///
/// Cloning is cheap; all clones share the same map.
#[derive(Clone)]
pub struct Registry {
    pub(crate) inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn new(
        engine: Arc<dyn DocEngine>,
        storage: Arc<dyn DocStorage>,
        presence: Arc<dyn PresenceStore>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                rooms: Mutex::new(HashMap::new()),
                engine,
                storage,
                presence,
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.inner.settings
    }

    /// Returns the room for `key`, loading it from storage on first use.
    ///
    /// Concurrent callers for the same key share one load: the map entry
    /// holds a cell that only one caller gets to initialize.
    pub async fn get_or_create_room(&self, key: &DocKey) -> Result<Arc<Room>, RelayError> {
        let slot = {
            let mut rooms = self.inner.rooms.lock().await;
            rooms.entry(key.clone()).or_default().clone()
        };

        let result = slot
            .get_or_try_init(|| async {
                let snapshot = self.inner.storage.load(key).await?;
                match &snapshot {
                    Some(bytes) => info!("Loaded document {} ({} bytes)", key, bytes.len()),
                    None => info!("Document {} has no stored state, starting empty", key),
                }
                let state = self.inner.engine.create(snapshot.as_deref())?;
                Ok::<_, RelayError>(Arc::new(Room::new(key.clone(), state)))
            })
            .await;

        match result {
            Ok(room) => Ok(room.clone()),
            Err(e) => {
                error!("Failed to open room {}: {}", key, e);
                let mut rooms = self.inner.rooms.lock().await;
                if let Some(current) = rooms.get(key) {
                    if Arc::ptr_eq(current, &slot) && !slot.initialized() {
                        rooms.remove(key);
                    }
                }
                Err(e)
            }
        }
    }

    /// Adds a connection to `room`, queueing the room's snapshot to it first.
    pub async fn add_connection(&self, room: &Arc<Room>, conn: ConnHandle) -> Result<(), RelayError> {
        let mut inner = room.lock().await;
        if inner.closed {
            return Err(RelayError::RoomClosed);
        }
        let snapshot = inner.state.full_state()?;
        // The queue is fresh, so this is always the first frame it delivers.
        if conn.try_send(Arc::new(snapshot)) != Enqueue::Queued {
            warn!("Connection {} went away before its snapshot", conn.id());
            return Err(RelayError::ConnectionGone);
        }
        debug!(
            "Connection {} (user {}) joined room {}",
            conn.id(),
            conn.user_id(),
            room.key()
        );
        inner.members.insert(
            conn.id(),
            Member {
                conn,
                needs_resync: false,
            },
        );
        Ok(())
    }

    /// Removes a connection; the last one out flushes and tears the room down.
    ///
    /// The final save runs without the room lock. A connection joining
    /// meanwhile keeps the room open. Returns whether the connection's user
    /// still has another connection in the room.
    pub async fn remove_connection(&self, room: &Arc<Room>, conn: &ConnHandle) -> bool {
        {
            let mut inner = room.lock().await;
            let removed = inner.members.remove(&conn.id()).is_some();
            if removed {
                debug!("Connection {} left room {}", conn.id(), room.key());
            }
            if !removed || !inner.members.is_empty() || inner.closed {
                return inner
                    .members
                    .values()
                    .any(|member| member.conn.user_id() == conn.user_id());
            }
            inner.cancel_flush_timer();
        }

        self.flush_room(room, true).await;
        false
    }

    /// Full join: find or open the room, add the connection, announce presence.
    pub async fn join(&self, key: &DocKey, conn: ConnHandle) -> Result<Arc<Room>, RelayError> {
        loop {
            let room = self.get_or_create_room(key).await?;
            match self.add_connection(&room, conn.clone()).await {
                Ok(()) => {
                    presence::announce_join(self.inner.presence.as_ref(), key, conn.user_id()).await;
                    return Ok(room);
                }
                // Lost a race with teardown; the entry is already gone.
                Err(RelayError::RoomClosed) => continue,
                Err(e) => {
                    // Do not leave a room behind that nobody ever joined.
                    let mut inner = room.lock().await;
                    if self.close_if_idle(&room, &mut inner).await {
                        debug!("Discarded unused room {}", key);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Removes the connection and clears the user's presence unless another
    /// of their connections is still in the room.
    pub async fn leave(&self, room: &Arc<Room>, conn: &ConnHandle) {
        if self.remove_connection(room, conn).await {
            debug!(
                "User {} still connected to {}, keeping presence",
                conn.user_id(),
                room.key()
            );
            return;
        }
        presence::announce_leave(self.inner.presence.as_ref(), room.key(), conn.user_id()).await;
    }

    /// Drops the registry entry for `room` if it still points at it.
    pub(crate) async fn deregister(&self, room: &Arc<Room>) {
        let mut rooms = self.inner.rooms.lock().await;
        let is_current = rooms
            .get(room.key())
            .and_then(|slot| slot.get())
            .map_or(false, |current| Arc::ptr_eq(current, room));
        if is_current {
            rooms.remove(room.key());
        }
    }

    pub async fn room(&self, key: &DocKey) -> Option<Arc<Room>> {
        let rooms = self.inner.rooms.lock().await;
        rooms.get(key).and_then(|slot| slot.get().cloned())
    }

    pub async fn rooms(&self) -> Vec<Arc<Room>> {
        let rooms = self.inner.rooms.lock().await;
        rooms.values().filter_map(|slot| slot.get().cloned()).collect()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms().await.len()
    }

    pub async fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for room in self.rooms().await {
            let inner = room.lock().await;
            stats.rooms += 1;
            stats.connections += inner.members.len();
            if inner.dirty {
                stats.dirty_rooms += 1;
            }
        }
        stats
    }

    pub(crate) async fn storage_save(&self, key: &DocKey, snapshot: &[u8]) -> Result<(), StorageError> {
        self.inner.storage.save(key, snapshot).await
    }
}
