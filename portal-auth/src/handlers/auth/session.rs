//! Password-session endpoints: login, refresh, logout, introspect.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;

use crate::handlers::auth::{auth_cookies, expired_cookies};
use crate::middleware::{CurrentSession, REFRESH_TOKEN_COOKIE};
use crate::models::identity::LoginRequest;
use crate::services::AuthError;
use crate::utils::ValidatedJson;
use crate::AppState;
use portal_core::error::AppError;

/// Login with email and password. Sets the access/refresh cookie pair and
/// returns the public profile.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (identity, set) = state.auth.login(&req.email, req.password).await?;

    let (access, refresh) = auth_cookies(&state.config, &set);
    let jar = jar.add(access).add(refresh);

    Ok((jar, Json(identity.public_profile())))
}

/// Rotate the refresh cookie into a fresh token set.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let old_token = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::from(AuthError::Unauthenticated))?;

    let (_identity_id, set) = state.auth.refresh(&old_token).await?;

    let (access, refresh) = auth_cookies(&state.config, &set);
    let jar = jar.add(access).add(refresh);

    Ok((
        jar,
        Json(serde_json::json!({
            "message": "Session refreshed"
        })),
    ))
}

/// Logout: destroy the refresh token and clear both cookies.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    if let Some(cookie) = jar.get(REFRESH_TOKEN_COOKIE) {
        state.auth.logout(cookie.value()).await?;
    }

    let (access, refresh) = expired_cookies(&state.config);
    let jar = jar.add(access).add(refresh);

    Ok((
        jar,
        Json(serde_json::json!({
            "message": "Logged out successfully"
        })),
    ))
}

/// Return the resolved session for the presented credential.
pub async fn introspect(CurrentSession(session): CurrentSession) -> impl IntoResponse {
    (StatusCode::OK, Json(session))
}
