use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use crate::db::dbcolab::{DbColab, DocPermission, DocumentAccess};
use crate::ws::capabilities::{AccessChecker, Role};
use crate::ws::docctx::DocKey;
use crate::ws::error::AccessError;

/// Map an ACL lookup to the role the relay enforces.
pub fn role_for(access: DocumentAccess) -> Result<Role, AccessError> {
    match access {
        DocumentAccess::Missing => Err(AccessError::NotFound),
        DocumentAccess::Denied => Err(AccessError::Forbidden),
        DocumentAccess::Granted(DocPermission::Owner | DocPermission::Edit) => Ok(Role::Editor),
        DocumentAccess::Granted(DocPermission::View) => Ok(Role::Viewer),
    }
}

/// Access checks against the `documents` / `document_acl` tables.
pub struct DbAccessChecker {
    db: Arc<DbColab>,
}

impl DbAccessChecker {
    pub fn new(db: Arc<DbColab>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccessChecker for DbAccessChecker {
    async fn check(&self, user_id: &str, doc: &DocKey) -> Result<Role, AccessError> {
        let access = self
            .db
            .document_access(&doc.kind, &doc.id, user_id)
            .await
            .map_err(|e| {
                error!("Access check for {} on {} failed: {}", user_id, doc, e);
                AccessError::Unavailable(e.to_string())
            })?;
        debug!("Access of {} on {}: {:?}", user_id, doc, access);
        role_for(access)
    }
}
