//! Organization-scoped endpoints owned by this service.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::middleware::CurrentSession;
use crate::models::{Action, Possession};
use crate::services::{Guard, OwnershipRef};
use crate::AppState;
use portal_core::error::AppError;

/// Switch the caller's current organization. The flag selects which role
/// is active for subsequent authorization decisions.
pub async fn switch_organization(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .engine
        .authorize(
            &session,
            &Guard::new("organization", Action::Update, Possession::Own),
            Some(OwnershipRef::Organization(org_id)),
        )
        .await?;

    let switched = state
        .db
        .switch_current_membership(session.identity.identity_id, org_id)
        .await?;

    if !switched {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "No membership in that organization"
        )));
    }

    Ok(Json(serde_json::json!({
        "message": "Current organization switched",
        "org_id": org_id
    })))
}
