//! Interfaces of the collaborators the relay consumes but does not own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::docctx::DocKey;
use super::error::{AccessError, AuthError, StorageError};
use crate::models::PresenceEntry;

pub use crate::crdt::{DocEngine, DocState};

/// Access level granted on a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
}

impl Role {
    pub fn can_edit(self) -> bool {
        matches!(self, Role::Editor)
    }
}

/// Resolves a bearer token to a user id.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify(&self, token: &str) -> Result<String, AuthError>;
}

/// Resolves the access a user has on a document.
#[async_trait]
pub trait AccessChecker: Send + Sync {
    async fn check(&self, user_id: &str, doc: &DocKey) -> Result<Role, AccessError>;
}

/// Durable home of document snapshots. One opaque blob per document,
/// overwritten wholesale on every save.
#[async_trait]
pub trait DocStorage: Send + Sync {
    async fn load(&self, doc: &DocKey) -> Result<Option<Vec<u8>>, StorageError>;
    async fn save(&self, doc: &DocKey, snapshot: &[u8]) -> Result<(), StorageError>;
}

/// Ephemeral TTL-bound presence per (document, user).
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn set(&self, doc: &DocKey, user_id: &str, active_field: Option<String>);
    async fn remove(&self, doc: &DocKey, user_id: &str);
    async fn list(&self, doc: &DocKey) -> Vec<PresenceEntry>;
    fn entry_count(&self) -> u64;
}
