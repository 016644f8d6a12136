use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::{debug, error};

use crate::models::{ApiError, ErrorResponse, PresenceListResponse, UpdatePresenceRequest};
use crate::routes::auth_middleware::AuthUser;
use crate::state::AppState;
use crate::ws::docctx::DocKey;
use crate::ws::error::AccessError;

/// Any role may read and publish presence; viewers are collaborators too.
async fn ensure_view_access(state: &AppState, user: &AuthUser, doc: &DocKey) -> Result<(), ApiError> {
    if !doc.is_valid() {
        return Err(ErrorResponse::api(StatusCode::BAD_REQUEST, "Invalid document id"));
    }
    match state.access.check(&user.0, doc).await {
        Ok(_) => Ok(()),
        Err(AccessError::NotFound) => Err(ErrorResponse::api(StatusCode::NOT_FOUND, "Document not found")),
        Err(AccessError::Forbidden) => Err(ErrorResponse::api(StatusCode::FORBIDDEN, "Access denied")),
        Err(AccessError::Unavailable(e)) => {
            error!("Access check for presence on {} failed: {}", doc, e);
            Err(ErrorResponse::api(StatusCode::SERVICE_UNAVAILABLE, "Access check unavailable"))
        }
    }
}

/// List who is present on a document
pub async fn get_presence(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((kind, doc_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<PresenceListResponse>), ApiError> {
    let doc = DocKey::new(kind, doc_id);
    ensure_view_access(&state, &user, &doc).await?;

    let entries = state.presence.list(&doc).await;
    debug!("User {} listed {} presence entries on {}", user.0, entries.len(), doc);
    Ok((
        StatusCode::OK,
        Json(PresenceListResponse {
            kind: doc.kind,
            doc_id: doc.id,
            entries,
        }),
    ))
}

/// Set the caller's focused field on a document
pub async fn put_presence(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((kind, doc_id)): Path<(String, String)>,
    Json(body): Json<UpdatePresenceRequest>,
) -> Result<StatusCode, ApiError> {
    let doc = DocKey::new(kind, doc_id);
    ensure_view_access(&state, &user, &doc).await?;

    state.presence.set(&doc, &user.0, body.active_field).await;
    Ok(StatusCode::NO_CONTENT)
}
