//! Debounced flushing of room state to storage.
//!
//! Every applied update re-arms a single per-room timer. When the room has
//! been quiet for the debounce window the merged state is saved wholesale.
//! A failed save keeps the dirty flag and re-arms the timer, so edits made
//! while storage is down live only in memory until a later save succeeds.
//!
//! The snapshot is encoded under the room lock but written with the lock
//! released, so relaying and liveness sweeps never wait on storage.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::MutexGuard;
use tracing::{debug, error, info};

use super::error::StorageError;
use super::registry::Registry;
use super::room::{Room, RoomInner};

impl Registry {
    /// (Re)starts the room's debounce timer, cancelling any pending one.
    pub(crate) fn arm_flush_timer(&self, room: &Arc<Room>, inner: &mut RoomInner) {
        inner.cancel_flush_timer();
        let registry = self.clone();
        let room = room.clone();
        let delay = self.settings().debounce;
        inner.flush_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.flush_due(&room).await;
        }));
    }

    /// Saves the room's state, holding the room lock only to encode it and
    /// to record the outcome.
    ///
    /// Saves of one room are serialized by its flush guard, so an older
    /// snapshot never overwrites a newer one. Returns the re-taken room
    /// lock, or `None` if there was nothing to save.
    async fn save_room<'a>(
        &self,
        room: &'a Room,
        force: bool,
    ) -> Result<Option<MutexGuard<'a, RoomInner>>, StorageError> {
        let _serial = room.flush_guard().await;
        let (snapshot, version) = {
            let inner = room.lock().await;
            if inner.closed || !(inner.dirty || force) {
                return Ok(None);
            }
            (inner.state.full_state()?, inner.version)
        };

        self.storage_save(room.key(), &snapshot).await?;

        let mut inner = room.lock().await;
        // Updates applied during the write stay dirty for the next flush.
        if inner.version == version {
            inner.dirty = false;
        }
        inner.last_flush = Some(Utc::now());
        info!("Flushed document {} ({} bytes)", room.key(), snapshot.len());
        Ok(Some(inner))
    }

    /// Flushes `room` and closes it if it is empty and fully persisted
    /// afterwards. With `force` the state is written even when clean.
    ///
    /// On failure the room is kept and a retry is scheduled, unless an
    /// update already armed one.
    pub(crate) async fn flush_room(&self, room: &Arc<Room>, force: bool) {
        let mut inner = match self.save_room(room, force).await {
            Ok(Some(inner)) => inner,
            Ok(None) => room.lock().await,
            Err(e) => {
                error!("Flush of {} failed, retrying later: {}", room.key(), e);
                let mut inner = room.lock().await;
                if !inner.closed && inner.flush_timer.is_none() {
                    self.arm_flush_timer(room, &mut inner);
                }
                return;
            }
        };
        if self.close_if_idle(room, &mut inner).await {
            info!("Room {} closed after final flush", room.key());
        }
    }

    /// Closes and deregisters `room` if nobody is in it and nothing is left
    /// to save. Returns whether it did.
    pub(crate) async fn close_if_idle(&self, room: &Arc<Room>, inner: &mut RoomInner) -> bool {
        if inner.closed || !inner.members.is_empty() || inner.dirty {
            return false;
        }
        inner.closed = true;
        inner.cancel_flush_timer();
        self.deregister(room).await;
        true
    }

    /// Timer callback: flush if dirty, retry on failure, and finish a
    /// teardown that an earlier failed flush left pending.
    async fn flush_due(&self, room: &Arc<Room>) {
        let force = {
            let mut inner = room.lock().await;
            // This task is the timer; forget its handle so a re-arm during
            // the save does not abort it.
            inner.flush_timer = None;
            if inner.closed {
                return;
            }
            inner.members.is_empty()
        };
        self.flush_room(room, force).await;
    }

    /// Flushes every dirty room now. Used on shutdown.
    pub async fn flush_all(&self) -> usize {
        let mut flushed = 0;
        for room in self.rooms().await {
            room.lock().await.cancel_flush_timer();
            match self.save_room(&room, false).await {
                Ok(Some(_)) => flushed += 1,
                Ok(None) => {}
                Err(e) => error!("Shutdown flush of {} failed: {}", room.key(), e),
            }
        }
        debug!("Flushed {} rooms", flushed);
        flushed
    }
}

#[cfg(test)]
mod tests {
    use crate::crdt::testing::{frame, items};
    use crate::ws::capabilities::Role;
    use crate::ws::connctx::ConnHandle;
    use crate::ws::docctx::DocKey;
    use crate::ws::testing::{registry_with, RecordingPresence, RecordingStorage};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn key() -> DocKey {
        DocKey::new("recipe", "r1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_produces_one_save_after_quiet_period() {
        let storage = Arc::new(RecordingStorage::new());
        let registry = registry_with(storage.clone(), Arc::new(RecordingPresence::default()));
        let debounce = registry.settings().debounce;
        let (a, _rx) = ConnHandle::new("alice", Role::Editor, 64);
        let room = registry.join(&key(), a.clone()).await.unwrap();

        let mut last_update = Instant::now();
        for i in 0..5 {
            registry.relay(&room, a.id(), frame(&[&format!("u{i}")])).await.unwrap();
            last_update = Instant::now();
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        assert_eq!(storage.save_count(), 0);

        tokio::time::sleep(debounce * 2).await;

        let saves = storage.saves();
        assert_eq!(saves.len(), 1);
        let fired_after = saves[0].0 - last_update;
        assert!(fired_after >= debounce);
        assert!(fired_after < debounce + Duration::from_millis(5));
        assert_eq!(items(&saves[0].1).len(), 5);
        assert!(!room.is_dirty().await);
        assert!(room.last_flush().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_keeps_dirty_and_retries() {
        let storage = Arc::new(RecordingStorage::new());
        let registry = registry_with(storage.clone(), Arc::new(RecordingPresence::default()));
        let debounce = registry.settings().debounce;
        let (a, _rx) = ConnHandle::new("alice", Role::Editor, 64);
        let room = registry.join(&key(), a.clone()).await.unwrap();

        storage.fail_saves(true);
        registry.relay(&room, a.id(), frame(&["x"])).await.unwrap();
        tokio::time::sleep(debounce + Duration::from_millis(10)).await;
        assert_eq!(storage.save_count(), 0);
        assert!(room.is_dirty().await);

        storage.fail_saves(false);
        tokio::time::sleep(debounce).await;
        assert_eq!(storage.save_count(), 1);
        assert!(!room.is_dirty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_pending_timer() {
        let storage = Arc::new(RecordingStorage::new());
        let registry = registry_with(storage.clone(), Arc::new(RecordingPresence::default()));
        let debounce = registry.settings().debounce;
        let (a, _rx) = ConnHandle::new("alice", Role::Editor, 64);
        let room = registry.join(&key(), a.clone()).await.unwrap();

        registry.relay(&room, a.id(), frame(&["x"])).await.unwrap();
        registry.leave(&room, &a).await;
        assert_eq!(storage.save_count(), 1);

        tokio::time::sleep(debounce * 3).await;
        assert_eq!(storage.save_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_teardown_after_failed_final_flush() {
        let storage = Arc::new(RecordingStorage::new());
        let registry = registry_with(storage.clone(), Arc::new(RecordingPresence::default()));
        let debounce = registry.settings().debounce;
        let (a, _rx) = ConnHandle::new("alice", Role::Editor, 64);
        let room = registry.join(&key(), a.clone()).await.unwrap();
        registry.relay(&room, a.id(), frame(&["x"])).await.unwrap();

        storage.fail_saves(true);
        registry.leave(&room, &a).await;
        assert!(registry.room(&key()).await.is_some());

        storage.fail_saves(false);
        tokio::time::sleep(debounce + Duration::from_millis(10)).await;
        assert_eq!(storage.save_count(), 1);
        assert!(registry.room(&key()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_save_does_not_block_relay_or_liveness() {
        let save_delay = Duration::from_secs(10);
        let storage = Arc::new(RecordingStorage::new().with_save_delay(save_delay));
        let registry = registry_with(storage.clone(), Arc::new(RecordingPresence::default()));
        let debounce = registry.settings().debounce;
        let (a, _rx_a) = ConnHandle::new("alice", Role::Editor, 64);
        let (b, mut rx_b) = ConnHandle::new("bob", Role::Editor, 64);
        let room = registry.join(&key(), a.clone()).await.unwrap();
        registry.join(&key(), b).await.unwrap();
        rx_b.frames.recv().await.unwrap();

        registry.relay(&room, a.id(), frame(&["first"])).await.unwrap();
        // The debounce fires and its save is now in flight.
        tokio::time::sleep(debounce + Duration::from_millis(10)).await;
        assert_eq!(storage.save_count(), 0);

        let bound = Duration::from_millis(500);
        tokio::time::timeout(bound, registry.relay(&room, a.id(), frame(&["second"])))
            .await
            .expect("relay waited on storage")
            .unwrap();
        let swept = tokio::time::timeout(bound, registry.sweep_liveness())
            .await
            .expect("liveness sweep waited on storage");
        assert_eq!(swept.pinged, 2);
        assert_eq!(*rx_b.frames.recv().await.unwrap(), frame(&["first"]));
        assert_eq!(*rx_b.frames.recv().await.unwrap(), frame(&["second"]));

        // The first save predates "second", so the room stays dirty.
        tokio::time::sleep(save_delay).await;
        assert_eq!(storage.save_count(), 1);
        assert!(room.is_dirty().await);

        tokio::time::sleep(debounce + save_delay).await;
        let saves = storage.saves();
        assert_eq!(saves.len(), 2);
        assert_eq!(items(&saves[1].1), items(&frame(&["first", "second"])));
        assert!(!room.is_dirty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_during_final_save_keeps_room_open() {
        let storage = Arc::new(RecordingStorage::new().with_save_delay(Duration::from_secs(5)));
        let registry = registry_with(storage.clone(), Arc::new(RecordingPresence::default()));
        let (a, _rx_a) = ConnHandle::new("alice", Role::Editor, 64);
        let room = registry.join(&key(), a.clone()).await.unwrap();
        registry.relay(&room, a.id(), frame(&["x"])).await.unwrap();

        let leaving = {
            let registry = registry.clone();
            let room = room.clone();
            tokio::spawn(async move { registry.leave(&room, &a).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        let (b, mut rx_b) = ConnHandle::new("bob", Role::Editor, 64);
        let joined = tokio::time::timeout(Duration::from_millis(500), registry.join(&key(), b))
            .await
            .expect("join waited on storage")
            .unwrap();
        assert!(Arc::ptr_eq(&joined, &room));
        assert_eq!(items(&rx_b.frames.recv().await.unwrap()), items(&frame(&["x"])));

        leaving.await.unwrap();
        assert_eq!(storage.save_count(), 1);
        assert!(registry.room(&key()).await.is_some());
        assert_eq!(room.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_flush_all_saves_dirty_rooms_only() {
        let storage = Arc::new(RecordingStorage::new());
        let registry = registry_with(storage.clone(), Arc::new(RecordingPresence::default()));
        let (a, _rx_a) = ConnHandle::new("alice", Role::Editor, 64);
        let (b, _rx_b) = ConnHandle::new("bob", Role::Editor, 64);
        let dirty = registry.join(&key(), a.clone()).await.unwrap();
        registry.join(&DocKey::new("recipe", "r2"), b).await.unwrap();
        registry.relay(&dirty, a.id(), frame(&["x"])).await.unwrap();

        assert_eq!(registry.flush_all().await, 1);
        assert_eq!(storage.save_count(), 1);
    }
}
