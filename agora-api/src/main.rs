//! Agora API Server Entry Point
//!
//! Loads configuration from the environment, wires the PostgreSQL stores,
//! identity cache and mailer, starts the limiter sweep job and serves HTTP
//! until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use agora_api::constants::{DEFAULT_BIND_HOST, DEFAULT_PORT};
use agora_api::telemetry::{init_tracing, TelemetryConfig};
use agora_api::{
    build_identity_cache, build_mailer, create_api_router, limiter_sweep_task, ApiConfig, ApiError,
    ApiResult, AppState, AuthConfig, Authenticator, DbClient, DbConfig, MailConfig,
};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracing(&telemetry_config)?;

    let api_config = ApiConfig::from_env();
    api_config
        .validate()
        .map_err(|e| ApiError::invalid_input(format!("Invalid API configuration: {}", e)))?;

    let authenticator = Authenticator::new(AuthConfig::from_env());

    let db_config = DbConfig::from_env();
    let db = DbClient::from_config(&db_config)?;
    db.apply_migrations().await?;
    let store = Arc::new(db.clone());

    let mailer = build_mailer(&MailConfig::from_env())
        .map_err(|e| ApiError::internal_error(format!("Failed to build mailer: {}", e)))?;
    let cache = build_identity_cache(&api_config.cache);
    let sweep_interval = api_config.rate_limit_sweep_interval;

    let state = AppState::new(api_config, authenticator, store.clone(), store, mailer, cache)
        .with_db(db);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = tokio::spawn(limiter_sweep_task(
        state.limiter.clone(),
        sweep_interval,
        shutdown_rx,
    ));

    let app = create_api_router(state)?;

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Agora API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>());
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    match sweep.await {
        Ok(metrics) => {
            let snapshot = metrics.snapshot();
            tracing::info!(
                sweeps = snapshot.sweeps,
                counters_removed = snapshot.counters_removed,
                "Limiter sweep stopped"
            );
        }
        Err(e) => tracing::warn!(error = %e, "Limiter sweep task ended abnormally"),
    }

    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("AGORA_API_BIND").unwrap_or_else(|_| DEFAULT_BIND_HOST.to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("AGORA_API_PORT").ok())
        .unwrap_or_else(|| DEFAULT_PORT.to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
