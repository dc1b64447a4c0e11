pub mod config;
pub mod db;
pub mod handlers;
pub mod idp;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use portal_core::error::AppError;
use portal_core::middleware::{
    rate_limit::ip_rate_limit_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AuthConfig;
use crate::services::{AccessControlEngine, AuthService, Database, OidcClient, TokenService};

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub db: Database,
    pub tokens: TokenService,
    pub auth: AuthService,
    pub engine: AccessControlEngine,
    pub oidc: OidcClient,
    pub login_rate_limiter: portal_core::middleware::rate_limit::IpRateLimiter,
    pub ip_rate_limiter: portal_core::middleware::rate_limit::IpRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Login gets its own, tighter rate limit on top of the global one.
    let login_limiter = state.login_rate_limiter.clone();
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    // Routes behind the session resolver + require-authenticated gate.
    // The resolver layer is added last so it runs first.
    let protected = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/introspect", get(handlers::auth::introspect))
        .route(
            "/auth/tokens",
            post(handlers::api_token::create_api_token).get(handlers::api_token::list_api_tokens),
        )
        .route(
            "/auth/tokens/:token_id",
            delete(handlers::api_token::revoke_api_token),
        )
        .route("/users/me/password", post(handlers::user::change_password))
        .route(
            "/orgs/:org_id/switch",
            post(handlers::org::switch_organization),
        )
        .route(
            "/admin/idp",
            get(handlers::admin::get_idp_config).put(handlers::admin::update_idp_config),
        )
        .layer(from_fn(middleware::require_auth))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::resolve_session,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route(
            "/auth/oidc/:provider",
            get(handlers::auth::authorize_redirect),
        )
        .route(
            "/auth/oidc/:provider/token",
            post(handlers::auth::token_exchange),
        )
        .merge(login_route)
        .merge(protected)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        // Add tracing layer
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        // Add security headers middleware
        .layer(from_fn(security_headers_middleware))
        // Add CORS layer
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<axum::http::HeaderValue>().unwrap_or_else(|e| {
                                tracing::error!(
                                    "Invalid CORS origin '{}': {}. Using fallback.",
                                    o,
                                    e
                                );
                                axum::http::HeaderValue::from_static("http://localhost:3000")
                            })
                        })
                        .collect::<Vec<axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ])
                .allow_credentials(true),
        );

    Ok(app)
}

/// Service health check
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    state.db.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::from(e)
    })?;

    Ok(axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "postgres": "up"
        }
    })))
}
