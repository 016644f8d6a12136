use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use crate::services::auth_service::get_auth_token;
use crate::state::AppState;
use crate::ws::error::AuthError;

/// Authenticated caller, inserted into request extensions.
#[derive(Clone, Debug)]
pub struct AuthUser(pub String);

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Get the auth token from the request
    let token = match get_auth_token(&req) {
        Ok(token) => token,
        Err(_) => return Err(StatusCode::UNAUTHORIZED),
    };

    // 2. Validate token
    let user_id = match state.auth.verify(&token).await {
        Ok(user_id) => user_id,
        Err(AuthError::NotConfigured) => {
            error!("Cloud auth JWT secret not configured");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
        Err(e) => {
            error!("JWT validation failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };
    debug!("Request authenticated for user {}", user_id);

    // 3. Hand the user to downstream handlers
    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}
