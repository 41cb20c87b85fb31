use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lobbychat::{
    abuse, api, auth,
    config::ServerConfig,
    session::{self, MemorySessionStore},
    state::AppState,
    storage::{BanStore, DiskImageStore, JsonFileBanStore},
    ws,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lobbychat=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting lobbychat...");

    let config = ServerConfig::from_env();
    let admin_credentials = auth::AdminCredentials::from_env();
    let flood_config = abuse::FloodConfig::from_env();

    let ban_store = Arc::new(JsonFileBanStore::new(&config.ban_db_path));
    let bans = match ban_store.load().await {
        Ok(bans) => bans,
        Err(e) => {
            tracing::warn!("Failed to load bans: {}. Starting with an empty list.", e);
            Default::default()
        }
    };

    let sessions = Arc::new(MemorySessionStore::new(config.session_ttl));
    let state = Arc::new(
        AppState::with_collaborators(
            sessions.clone(),
            ban_store,
            Arc::new(DiskImageStore::new(&config.upload_dir)),
            bans,
        )
        .with_flood_guard(flood_config.guard.clone())
        .with_admin_credentials(admin_credentials),
    );

    // Spawn background task for purging expired sessions
    session::spawn_session_sweeper(sessions, Duration::from_secs(10 * 60));

    // Spawn background task for dropping stale flood windows
    if let Some(guard) = flood_config.guard {
        abuse::spawn_flood_cleanup(guard, Duration::from_secs(60));
    }

    let api_routes = Router::new()
        .route("/login", post(api::login))
        .route("/admin/login", post(api::admin_login))
        .route("/logout", post(api::logout))
        .route("/rooms", get(api::list_rooms))
        .route(
            "/rooms/{room_id}/images",
            post(api::upload_image).layer(DefaultBodyLimit::max(api::MAX_IMAGE_BYTES + 64 * 1024)),
        )
        .route("/admin/rooms/{room_id}/log", get(api::download_room_log));

    let app = Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws::ws_handler))
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    let addr = config.addr();
    tracing::info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
