use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One user's presence on a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PresenceEntry {
    pub user_id: String,
    /// Field the user is focused on, if any.
    pub active_field: Option<String>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PresenceListResponse {
    pub kind: String,
    pub doc_id: String,
    pub entries: Vec<PresenceEntry>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdatePresenceRequest {
    pub active_field: Option<String>,
}
