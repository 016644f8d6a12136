//! Membership-level presence: who is joined to a document.
//!
//! Field focus is written by clients through the REST presence endpoint;
//! the relay only marks a user present on join and clears them on leave.

use tracing::debug;

use super::capabilities::PresenceStore;
use super::docctx::DocKey;

pub async fn announce_join(store: &dyn PresenceStore, doc: &DocKey, user_id: &str) {
    store.set(doc, user_id, None).await;
    debug!("Presence set for {} on {}", user_id, doc);
}

pub async fn announce_leave(store: &dyn PresenceStore, doc: &DocKey, user_id: &str) {
    store.remove(doc, user_id).await;
    debug!("Presence cleared for {} on {}", user_id, doc);
}
