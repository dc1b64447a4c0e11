//! API-token management for the authenticated identity.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::middleware::CurrentSession;
use crate::models::api_token::{ApiTokenResponse, CreateApiTokenRequest};
use crate::utils::ValidatedJson;
use crate::AppState;
use portal_core::error::AppError;

/// Create an API token. The `{id}_{secret}` bearer value is returned
/// exactly once.
pub async fn create_api_token(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    ValidatedJson(req): ValidatedJson<CreateApiTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let created = state
        .auth
        .create_api_token(session.identity.identity_id, &req.label)
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// List the caller's API tokens (metadata only, never secrets).
pub async fn list_api_tokens(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state
        .db
        .list_api_tokens(session.identity.identity_id)
        .await?;

    let tokens: Vec<ApiTokenResponse> = tokens.into_iter().map(ApiTokenResponse::from).collect();
    Ok(Json(tokens))
}

/// Revoke one of the caller's API tokens.
pub async fn revoke_api_token(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(token_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = state
        .db
        .delete_api_token(token_id, session.identity.identity_id)
        .await?;

    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("API token not found")));
    }

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "API token revoked"
        })),
    ))
}
