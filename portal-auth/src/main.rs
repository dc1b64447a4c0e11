use portal_auth::{
    build_router,
    config::AuthConfig,
    db,
    services::{AccessControlEngine, AuthService, Database, GrantTable, OidcClient, TokenService},
    AppState,
};
use portal_core::error::AppError;
use portal_core::middleware::rate_limit::create_ip_rate_limiter;
use portal_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting authentication service"
    );

    // Initialize database connection
    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
    let database = Database::new(pool);

    // Initialize token service
    let tokens = TokenService::new(&config.jwt)?;

    // Outbound OIDC client with a bounded timeout
    let oidc = OidcClient::new(config.oidc.outbound_timeout_secs)?;

    // Load the grant table BEFORE accepting traffic. A failed load aborts
    // startup, so no request is ever evaluated against a partial table.
    let table = GrantTable::load(&database).await.map_err(AppError::from)?;
    let engine = AccessControlEngine::new(Arc::new(table), Arc::new(database.clone()));

    let auth = AuthService::new(database.clone(), tokens.clone());

    // Rate limiters
    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );

    let state = AppState {
        config: config.clone(),
        db: database,
        tokens,
        auth,
        engine,
        oidc,
        login_rate_limiter,
        ip_rate_limiter,
    };

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
