//! In-process adapters used when no database is configured.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

use crate::ws::capabilities::{AccessChecker, DocStorage, Role};
use crate::ws::docctx::DocKey;
use crate::ws::error::{AccessError, StorageError};

/// Snapshots kept in memory for the lifetime of the process.
#[derive(Default)]
pub struct MemoryDocStore {
    docs: RwLock<HashMap<DocKey, Vec<u8>>>,
}

impl MemoryDocStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocStorage for MemoryDocStore {
    async fn load(&self, doc: &DocKey) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.docs.read().await.get(doc).cloned())
    }

    async fn save(&self, doc: &DocKey, snapshot: &[u8]) -> Result<(), StorageError> {
        self.docs.write().await.insert(doc.clone(), snapshot.to_vec());
        debug!("Stored {} bytes for {} in memory", snapshot.len(), doc);
        Ok(())
    }
}

/// Fixed grant table. Documents without any grant do not exist.
#[derive(Default)]
pub struct StaticAccessChecker {
    allow_all: bool,
    documents: HashSet<DocKey>,
    grants: HashMap<(DocKey, String), Role>,
}

impl StaticAccessChecker {
    /// Denies everything until grants are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every authenticated user edits every document.
    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            ..Self::default()
        }
    }

    /// Registers a document nobody has been granted access to yet.
    pub fn with_document(mut self, doc: DocKey) -> Self {
        self.documents.insert(doc);
        self
    }

    pub fn grant(mut self, doc: DocKey, user_id: impl Into<String>, role: Role) -> Self {
        self.documents.insert(doc.clone());
        self.grants.insert((doc, user_id.into()), role);
        self
    }
}

#[async_trait]
impl AccessChecker for StaticAccessChecker {
    async fn check(&self, user_id: &str, doc: &DocKey) -> Result<Role, AccessError> {
        if self.allow_all {
            return Ok(Role::Editor);
        }
        if let Some(role) = self.grants.get(&(doc.clone(), user_id.to_string())) {
            return Ok(*role);
        }
        if self.documents.contains(doc) {
            Err(AccessError::Forbidden)
        } else {
            Err(AccessError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_overwrites() {
        let store = MemoryDocStore::new();
        let doc = DocKey::new("recipe", "r1");
        assert_eq!(store.load(&doc).await.unwrap(), None);
        store.save(&doc, b"one").await.unwrap();
        store.save(&doc, b"two").await.unwrap();
        assert_eq!(store.load(&doc).await.unwrap(), Some(b"two".to_vec()));
    }

    #[tokio::test]
    async fn test_static_grants() {
        let doc = DocKey::new("recipe", "r1");
        let checker = StaticAccessChecker::new()
            .grant(doc.clone(), "alice", Role::Editor)
            .grant(doc.clone(), "vera", Role::Viewer);

        assert_eq!(checker.check("alice", &doc).await.unwrap(), Role::Editor);
        assert_eq!(checker.check("vera", &doc).await.unwrap(), Role::Viewer);
        assert!(matches!(checker.check("mallory", &doc).await, Err(AccessError::Forbidden)));
        assert!(matches!(
            checker.check("alice", &DocKey::new("recipe", "nope")).await,
            Err(AccessError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_allow_all() {
        let checker = StaticAccessChecker::allow_all();
        let role = checker.check("anyone", &DocKey::new("recipe", "r9")).await.unwrap();
        assert_eq!(role, Role::Editor);
    }
}
