//! Service-area map API server entry point.

use std::sync::Arc;

use servicemap_api::config::ApiConfig;
use servicemap_api::error::AppError;
use servicemap_api::state::AppState;
use servicemap_core::clock::SystemClock;
use servicemap_event_store::pg_event_repository::PgEventRepository;
use servicemap_service_area::application::cache::SnapshotCache;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting service-area map API server");

    let config = ApiConfig::from_env()?;
    let addr = config.socket_addr()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    let event_repository = PgEventRepository::new(pool);
    event_repository.ensure_schema().await?;

    let mut app_state = AppState::new(
        Arc::new(SystemClock),
        Arc::new(event_repository),
        config.projector(),
    );
    if let Some(ttl) = config.cache_ttl {
        tracing::info!(
            ttl_secs = ttl.num_seconds(),
            max_past_entries = config.cache_max_past_entries,
            "snapshot cache enabled"
        );
        let cache = SnapshotCache::new(ttl).with_max_past_entries(config.cache_max_past_entries);
        app_state = app_state.with_cache(Arc::new(cache));
    }

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = servicemap_api::build_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!(
        %addr,
        creation_policy = ?config.creation_policy,
        history_key = ?config.history_key,
        "Listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
