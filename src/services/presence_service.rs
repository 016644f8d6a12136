use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

use crate::models::PresenceEntry;
use crate::ws::capabilities::PresenceStore;
use crate::ws::docctx::DocKey;

/// Presence entries in a moka cache; an entry not refreshed within the TTL
/// disappears on its own.
pub struct MokaPresenceStore {
    cache: Cache<(DocKey, String), PresenceEntry>,
}

impl MokaPresenceStore {
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl PresenceStore for MokaPresenceStore {
    async fn set(&self, doc: &DocKey, user_id: &str, active_field: Option<String>) {
        let entry = PresenceEntry {
            user_id: user_id.to_string(),
            active_field,
            last_seen: Utc::now(),
        };
        self.cache.insert((doc.clone(), user_id.to_string()), entry).await;
    }

    async fn remove(&self, doc: &DocKey, user_id: &str) {
        self.cache.invalidate(&(doc.clone(), user_id.to_string())).await;
    }

    async fn list(&self, doc: &DocKey) -> Vec<PresenceEntry> {
        let mut entries: Vec<PresenceEntry> = self
            .cache
            .iter()
            .filter(|(key, _)| &key.0 == doc)
            .map(|(_, entry)| entry)
            .collect();
        entries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        debug!("{} presence entries on {}", entries.len(), doc);
        entries
    }

    fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
