//! OIDC federation endpoints.
//!
//! Three stateless steps against the configured external provider:
//! authorize redirect, code exchange, ID-token verification. Account
//! linkage then runs in one transaction (see `Database::link_federated_login`).

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use validator::Validate;

use crate::handlers::auth::auth_cookies;
use crate::idp;
use crate::models::IdpConfiguration;
use crate::services::{AuthError, OidcClient};
use crate::utils::ValidatedJson;
use crate::AppState;
use portal_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct OidcAuthorizeQuery {
    /// Opaque, caller-supplied CSRF state, echoed back by the provider.
    pub state: String,
    /// Selects the invite sign-in redirect URI.
    #[serde(default)]
    pub invite: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OidcTokenRequest {
    #[validate(length(min = 1, max = 2048))]
    pub code: String,
    #[serde(default)]
    pub invite: bool,
}

/// Load the active configuration and check it matches the requested
/// provider path segment. Read fresh per request - never cached - so a
/// runtime provider switch takes effect immediately.
async fn active_config_for(
    state: &AppState,
    provider: &str,
) -> Result<IdpConfiguration, AppError> {
    let config = state
        .db
        .find_active_idp_config()
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| {
            AppError::from(AuthError::ProviderMisconfigured(
                "no active identity provider configuration".to_string(),
            ))
        })?;

    if config.provider != provider {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "unknown identity provider"
        )));
    }

    Ok(config)
}

fn select_redirect_uri(state: &AppState, invite: bool) -> &str {
    if invite {
        &state.config.oidc.invite_redirect_uri
    } else {
        &state.config.oidc.redirect_uri
    }
}

/// Step 1: build the provider authorization redirect. No local state is
/// written; the `state` parameter rides through the provider untouched.
pub async fn authorize_redirect(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OidcAuthorizeQuery>,
) -> Result<Redirect, AppError> {
    if query.state.len() < 5 || query.state.len() > 512 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "state must be between 5 and 512 bytes"
        )));
    }

    let config = active_config_for(&state, &provider).await?;
    let client = idp::ensure_sso_client(
        &state.db,
        &config,
        state.oidc.http(),
        &[
            state.config.oidc.redirect_uri.clone(),
            state.config.oidc.invite_redirect_uri.clone(),
        ],
    )
    .await?;

    let doc = state.oidc.discover(&config.discovery_url).await?;
    let url = OidcClient::build_authorize_url(
        &doc,
        &client.client_id,
        select_redirect_uri(&state, query.invite),
        &query.state,
    );

    Ok(Redirect::to(&url))
}

/// Steps 2+3 and linkage: exchange the code, verify the ID token against
/// the provider's JWKS, resolve the identity, and set the same cookies as
/// password login.
pub async fn token_exchange(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<OidcTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let config = active_config_for(&state, &provider).await?;
    let client = idp::ensure_sso_client(
        &state.db,
        &config,
        state.oidc.http(),
        &[
            state.config.oidc.redirect_uri.clone(),
            state.config.oidc.invite_redirect_uri.clone(),
        ],
    )
    .await?;

    let doc = state.oidc.discover(&config.discovery_url).await?;

    let exchange = state
        .oidc
        .exchange_code(
            &doc.token_endpoint,
            &req.code,
            &client.client_id,
            &client.client_secret,
            select_redirect_uri(&state, req.invite),
        )
        .await?;

    let id_token = exchange
        .id_token
        .ok_or_else(|| AppError::from(AuthError::FederationVerificationFailed))?;

    let claims = state
        .oidc
        .verify_id_token(&doc.jwks_uri, &doc.issuer, &client.client_id, &id_token)
        .await?;

    let (identity, set) = state.auth.federated_login(&provider, &claims).await?;

    let (access, refresh) = auth_cookies(&state.config, &set);
    let jar = jar.add(access).add(refresh);

    Ok((jar, Json(identity.public_profile())))
}
