//! Profile endpoints for the authenticated identity.

use axum::{extract::State, response::IntoResponse, Json};

use crate::middleware::CurrentSession;
use crate::models::identity::ChangePasswordRequest;
use crate::utils::ValidatedJson;
use crate::AppState;
use portal_core::error::AppError;

/// Change the caller's password. Every refresh token the caller holds is
/// revoked in the same transaction; existing sessions must re-authenticate
/// once their access token expires.
pub async fn change_password(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .change_password(
            session.identity.identity_id,
            req.current_password,
            req.new_password,
        )
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Password changed. Other sessions have been signed out."
    })))
}
