use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use crate::db::dbcolab::DbColab;
use crate::ws::capabilities::DocStorage;
use crate::ws::docctx::DocKey;
use crate::ws::error::StorageError;

/// Snapshot storage backed by the `document_snapshots` table.
pub struct DbDocStore {
    db: Arc<DbColab>,
}

impl DbDocStore {
    pub fn new(db: Arc<DbColab>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DocStorage for DbDocStore {
    async fn load(&self, doc: &DocKey) -> Result<Option<Vec<u8>>, StorageError> {
        debug!("Loading snapshot of {}", doc);
        self.db.load_snapshot(&doc.kind, &doc.id).await.map_err(|e| {
            error!("Database error loading document '{}': {}", doc, e);
            StorageError::from(e)
        })
    }

    async fn save(&self, doc: &DocKey, snapshot: &[u8]) -> Result<(), StorageError> {
        self.db.save_snapshot(&doc.kind, &doc.id, snapshot).await?;
        Ok(())
    }
}
