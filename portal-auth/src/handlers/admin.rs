//! Admin endpoints: identity-provider configuration.

use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;

use crate::idp;
use crate::middleware::CurrentSession;
use crate::models::idp_config::{IdpConfigResponse, UpdateIdpConfigRequest};
use crate::models::{Action, IdpConfiguration, Possession};
use crate::services::Guard;
use crate::utils::ValidatedJson;
use crate::AppState;
use portal_core::error::AppError;

/// Read the active identity-provider configuration.
pub async fn get_idp_config(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<impl IntoResponse, AppError> {
    state
        .engine
        .authorize(
            &session,
            &Guard::new("idp", Action::Read, Possession::Any).with_admin_override(),
            None,
        )
        .await?;

    let config = state
        .db
        .find_active_idp_config()
        .await?
        .map(IdpConfigResponse::from);

    Ok(Json(config))
}

/// Replace the active identity-provider configuration.
///
/// Switching providers tears down the superseded client registration
/// best-effort: a provider-side failure is logged, not fatal, since the
/// new configuration must take effect regardless.
pub async fn update_idp_config(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    ValidatedJson(req): ValidatedJson<UpdateIdpConfigRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .engine
        .authorize(
            &session,
            &Guard::new("idp", Action::Update, Possession::Any).with_admin_override(),
            None,
        )
        .await?;

    let previous = state.db.find_active_idp_config().await?;

    if let Some(previous) = previous.filter(|p| p.provider != req.provider) {
        teardown_sso_client(&state, &previous).await;
    }

    let config = IdpConfiguration {
        provider: req.provider,
        active: true,
        discovery_url: req.discovery_url,
        registration_endpoint: req.registration_endpoint,
        bootstrap_id: req.bootstrap_id,
        bootstrap_secret: req.bootstrap_secret,
        created_utc: Utc::now(),
    };

    state.db.upsert_active_idp_config(&config).await?;

    tracing::info!(provider = %config.provider, "Active identity provider replaced");
    Ok(Json(IdpConfigResponse::from(config)))
}

async fn teardown_sso_client(state: &AppState, previous: &IdpConfiguration) {
    let client = match state.db.find_sso_client(&previous.provider).await {
        Ok(Some(client)) => client,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(error = %e, provider = %previous.provider, "Could not load SSO client for teardown");
            return;
        }
    };

    match idp::provider_for(previous, state.oidc.http()) {
        Ok(provider) => {
            if let Err(e) = provider.delete_client(&client.client_id, &client.extra).await {
                tracing::warn!(error = %e, provider = %previous.provider, "SSO client deregistration failed");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, provider = %previous.provider, "Could not construct provider for teardown");
        }
    }

    if let Err(e) = state.db.delete_sso_client(&previous.provider).await {
        tracing::warn!(error = %e, provider = %previous.provider, "Could not drop SSO client row");
    }
}
