use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for an error
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}

/// Error shape returned by the REST handlers.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

impl ErrorResponse {
    pub fn api(status: StatusCode, error: impl Into<String>) -> ApiError {
        (
            status,
            Json(ErrorResponse {
                code: status.as_u16(),
                status: status.to_string(),
                error: error.into(),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_carries_status_code() {
        let (status, Json(body)) = ErrorResponse::api(StatusCode::FORBIDDEN, "nope");
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, 403);
        assert_eq!(body.status, "403 Forbidden");
        assert_eq!(body.error, "nope");
    }
}
