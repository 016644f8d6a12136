use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/ready",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Database is not reachable", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Relay and host statistics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Diagnostics", body = DiagnosticsResponse),
        (status = 401, description = "Missing or invalid token")
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// List who is present on a document
#[utoipa::path(
    get,
    path = "/api/v1/{kind}/{doc_id}/presence",
    params(
        ("kind" = String, Path, description = "Document kind"),
        ("doc_id" = String, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Presence entries", body = PresenceListResponse),
        (status = 403, description = "Access denied", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn get_presence_doc() {}

/// Set the caller's focused field on a document
#[utoipa::path(
    put,
    path = "/api/v1/{kind}/{doc_id}/presence",
    params(
        ("kind" = String, Path, description = "Document kind"),
        ("doc_id" = String, Path, description = "Document id")
    ),
    request_body = UpdatePresenceRequest,
    responses(
        (status = 204, description = "Presence updated"),
        (status = 403, description = "Access denied", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn put_presence_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        get_presence_doc,
        put_presence_doc,
    ),
    components(
        schemas(
            HealthResponse,
            DiagnosticsResponse,
            ErrorResponse,
            PresenceEntry,
            PresenceListResponse,
            UpdatePresenceRequest
        )
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
