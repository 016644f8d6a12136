use colabri_relay::config::Config;
use colabri_relay::crdt::LoroEngine;
use colabri_relay::db::dbcolab::DbColab;
use colabri_relay::services::access_service::DbAccessChecker;
use colabri_relay::services::auth_service::JwtAuthenticator;
use colabri_relay::services::doc_db_service::DbDocStore;
use colabri_relay::services::memory::{MemoryDocStore, StaticAccessChecker};
use colabri_relay::services::presence_service::MokaPresenceStore;
use colabri_relay::state::AppState;
use colabri_relay::ws::capabilities::{AccessChecker, DocStorage, PresenceStore};
use colabri_relay::ws::registry::Registry;
use colabri_relay::build_router;
use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "colabri_relay=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    // Storage and access control: Postgres when configured, memory otherwise
    let db = match &config.db_url {
        Some(db_url) => match DbColab::new(db_url).await {
            Ok(db) => {
                if let Err(e) = db.ensure_schema().await {
                    error!("Failed to prepare snapshot table: {}", e);
                }
                info!("Database initialized successfully");
                Some(Arc::new(db))
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                None
            }
        },
        None => None,
    };

    let (storage, access): (Arc<dyn DocStorage>, Arc<dyn AccessChecker>) = match &db {
        Some(db) => (
            Arc::new(DbDocStore::new(db.clone())),
            Arc::new(DbAccessChecker::new(db.clone())),
        ),
        None => {
            warn!("No database available - documents are kept in memory only");
            let access = if config.dev_access_all {
                warn!("Every authenticated user may edit every document");
                StaticAccessChecker::allow_all()
            } else {
                StaticAccessChecker::new()
            };
            (Arc::new(MemoryDocStore::new()), Arc::new(access))
        }
    };

    let presence: Arc<dyn PresenceStore> = Arc::new(MokaPresenceStore::new(config.presence_ttl()));
    let registry = Registry::new(
        Arc::new(LoroEngine::new()),
        storage,
        presence.clone(),
        config.relay_settings(),
    );
    let liveness = registry.spawn_liveness_monitor();

    let state = AppState {
        config: Arc::new(config.clone()),
        registry: registry.clone(),
        auth: Arc::new(JwtAuthenticator::new(config.cloud_auth_jwt_secret.clone())),
        access,
        presence,
        db,
    };
    let app_routes = build_router(state);

    // Start the HTTP/WebSocket server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("Server running on http://{}", config.server_address());
    info!("WebSocket available at ws://{}/ws/:kind/:doc_id", config.server_address());
    info!("Swagger UI available at http://{}/swagger", config.server_address());

    if let Err(e) = axum::serve(listener, app_routes)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    // Do not lose edits still inside the debounce window
    liveness.abort();
    let flushed = registry.flush_all().await;
    info!("Shutdown complete, flushed {} documents", flushed);
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
