//! GigBridge API Server Entry Point
//!
//! Wires the cache backend, the PostgreSQL store and the query layer, then
//! serves the router until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use gigbridge_api::telemetry::{init_tracing, TelemetryConfig};
use gigbridge_api::{
    create_api_router, resolve_bind_addr, ApiConfig, ApiError, ApiResult, AppState, DbConfig,
    PgMarketplaceStore,
};
use gigbridge_core::GigError;
use gigbridge_storage::{open_store, CacheAside, CacheSettings, MarketplaceStore};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let api_config = ApiConfig::from_env();
    let cache_settings = CacheSettings::from_env().map_err(GigError::from)?;

    let cache_store = open_store(&cache_settings).map_err(GigError::from)?;
    let cache = CacheAside::new(Arc::clone(&cache_store), cache_settings.compute_timeout);

    let db_config = DbConfig::from_env();
    let pg = PgMarketplaceStore::from_config(&db_config)?;
    if db_config.apply_schema {
        pg.apply_schema().await?;
        tracing::info!("Database schema applied");
    }
    let store: Arc<dyn MarketplaceStore> = Arc::new(pg);

    let state = AppState::new(store, cache_store, cache, cache_settings.ttl, api_config);
    let app = create_api_router(state);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting GigBridge API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
