use crate::{
    handlers::{diagnostics, get_presence, health_check, put_presence, ready_check},
    routes::auth_middleware::auth_middleware,
    state::AppState,
};
use axum::{middleware, routing::get, Router};

/// Create API routes
pub fn create_api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::<AppState>::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/:kind/:doc_id/presence", get(get_presence).put(put_presence))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware)); // Applies to all routes added above

    Router::<AppState>::new()
        .route("/v1/health", get(health_check))
        .route("/v1/ready", get(ready_check))
        .merge(protected)
}
