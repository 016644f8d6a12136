use async_trait::async_trait;
use axum::http::{self};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use tracing::{debug, error};

use crate::ws::capabilities::Authenticator;
use crate::ws::error::AuthError;

/// Get the auth token from a request: `Authorization: Bearer` first, then
/// the `auth_token` cookie.
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, AuthError> {
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AuthError::Invalid("invalid Authorization header".to_string()))?;
        let token = auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).trim();
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        return Ok(token.to_string());
    }

    let cookie_header = req
        .headers()
        .get(http::header::COOKIE)
        .ok_or(AuthError::Missing)?
        .to_str()
        .map_err(|_| AuthError::Invalid("invalid Cookie header".to_string()))?;

    for cookie in cookie::Cookie::split_parse(cookie_header).flatten() {
        if cookie.name() == "auth_token" && !cookie.value().is_empty() {
            return Ok(cookie.value().to_string());
        }
    }
    Err(AuthError::Missing)
}

// Validate a JWT token and return the token data
pub fn validate_jwt(
    token: &str,
    secret: &str,
) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

/// Extract the user id from validated claims. Only `type: "user"` tokens
/// open documents.
pub fn user_id_from_claims(claims: &serde_json::Value) -> Result<String, AuthError> {
    let token_type = claims
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AuthError::Invalid("token does not contain a 'type' claim".to_string()))?;
    if token_type != "user" {
        return Err(AuthError::NotAUser);
    }
    claims
        .get("sub")
        .and_then(|v| v.as_str())
        .filter(|sub| !sub.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AuthError::Invalid("token does not contain a 'sub' claim".to_string()))
}

/// HS256 bearer-token verification against the shared cloud secret.
pub struct JwtAuthenticator {
    secret: Option<String>,
}

impl JwtAuthenticator {
    pub fn new(secret: Option<String>) -> Self {
        if secret.is_none() {
            error!("Cloud auth JWT secret not configured, every token will be refused");
        }
        Self { secret }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn verify(&self, token: &str) -> Result<String, AuthError> {
        let secret = self.secret.as_deref().ok_or(AuthError::NotConfigured)?;
        let token_data =
            validate_jwt(token, secret).map_err(|e| AuthError::Invalid(e.to_string()))?;
        let user_id = user_id_from_claims(&token_data.claims)?;
        debug!("JWT token validated for user {}", user_id);
        Ok(user_id)
    }
}
