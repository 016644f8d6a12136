//! Recording fakes for the relay's collaborators.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use super::capabilities::{DocStorage, PresenceStore};
use super::docctx::DocKey;
use super::error::StorageError;
use super::registry::{Registry, RelaySettings};
use crate::crdt::testing::SetEngine;
use crate::models::PresenceEntry;

#[derive(Default)]
pub(crate) struct RecordingStorage {
    docs: Mutex<HashMap<DocKey, Vec<u8>>>,
    saves: Mutex<Vec<(Instant, Vec<u8>)>>,
    loads: AtomicUsize,
    load_delay: Option<Duration>,
    save_delay: Option<Duration>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Every save takes `delay` before it lands.
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = Some(delay);
        self
    }

    pub fn seed(&self, key: &DocKey, bytes: Vec<u8>) {
        self.docs.lock().unwrap().insert(key.clone(), bytes);
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }

    /// Successful saves with the (tokio) instant they happened at.
    pub fn saves(&self) -> Vec<(Instant, Vec<u8>)> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocStorage for RecordingStorage {
    async fn load(&self, doc: &DocKey) -> Result<Option<Vec<u8>>, StorageError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("load refused".to_string()));
        }
        Ok(self.docs.lock().unwrap().get(doc).cloned())
    }

    async fn save(&self, doc: &DocKey, snapshot: &[u8]) -> Result<(), StorageError> {
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("save refused".to_string()));
        }
        self.docs.lock().unwrap().insert(doc.clone(), snapshot.to_vec());
        self.saves.lock().unwrap().push((Instant::now(), snapshot.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingPresence {
    entries: Mutex<HashMap<(DocKey, String), Option<String>>>,
}

impl RecordingPresence {
    pub fn contains(&self, doc: &DocKey, user_id: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .contains_key(&(doc.clone(), user_id.to_string()))
    }
}

#[async_trait]
impl PresenceStore for RecordingPresence {
    async fn set(&self, doc: &DocKey, user_id: &str, active_field: Option<String>) {
        self.entries
            .lock()
            .unwrap()
            .insert((doc.clone(), user_id.to_string()), active_field);
    }

    async fn remove(&self, doc: &DocKey, user_id: &str) {
        self.entries
            .lock()
            .unwrap()
            .remove(&(doc.clone(), user_id.to_string()));
    }

    async fn list(&self, doc: &DocKey) -> Vec<PresenceEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|((d, _), _)| d == doc)
            .map(|((_, user_id), field)| PresenceEntry {
                user_id: user_id.clone(),
                active_field: field.clone(),
                last_seen: Utc::now(),
            })
            .collect()
    }

    fn entry_count(&self) -> u64 {
        self.entries.lock().unwrap().len() as u64
    }
}

pub(crate) fn registry_with(
    storage: Arc<RecordingStorage>,
    presence: Arc<RecordingPresence>,
) -> Registry {
    registry_with_settings(storage, presence, RelaySettings::default())
}

pub(crate) fn registry_with_settings(
    storage: Arc<RecordingStorage>,
    presence: Arc<RecordingPresence>,
    settings: RelaySettings,
) -> Registry {
    Registry::new(Arc::new(SetEngine), storage, presence, settings)
}
