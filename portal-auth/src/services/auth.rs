//! Authentication service: password login, refresh rotation, logout,
//! password change, API tokens, and federated-login linkage.

use std::collections::HashMap;
use uuid::Uuid;

use crate::models::api_token::CreatedApiTokenResponse;
use crate::models::{ApiToken, Identity, RefreshToken};
use crate::services::database::Database;
use crate::services::error::AuthError;
use crate::services::oidc::IdTokenClaims;
use crate::services::token::{TokenService, TokenSet};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(db: Database, tokens: TokenService) -> Self {
        Self { db, tokens }
    }

    /// Password login.
    ///
    /// Unknown email, wrong password, federated-only account, and a
    /// pending (not yet activated) account all collapse into the same
    /// `InvalidCredentials` so the endpoint cannot be used to enumerate
    /// accounts.
    pub async fn login(&self, email: &str, password: String) -> Result<(Identity, TokenSet), AuthError> {
        let identity = self
            .db
            .find_identity_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !identity.can_password_authenticate() {
            return Err(AuthError::InvalidCredentials);
        }

        let hash = identity
            .password_hash
            .clone()
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(&Password::new(password), &PasswordHashString::new(hash))
            .map_err(|_| AuthError::InvalidCredentials)?;

        let set = self.tokens.issue_token_set(identity.identity_id)?;

        self.db
            .insert_refresh_token(&RefreshToken {
                token: set.refresh.token.clone(),
                identity_id: identity.identity_id,
                expires_utc: set.refresh.expires_utc,
            })
            .await?;

        self.db.touch_last_login(identity.identity_id).await?;

        tracing::info!(identity_id = %identity.identity_id, "Password login");
        Ok((identity, set))
    }

    /// Rotate a refresh token into a fresh token set.
    ///
    /// A token that is not found (already used, expired, revoked) is a
    /// potential replay and answers `Unauthenticated` - never a retry.
    pub async fn refresh(&self, old_token: &str) -> Result<(Uuid, TokenSet), AuthError> {
        let issued = self.tokens.issue_refresh_token();

        let identity_id = self
            .db
            .rotate_refresh_token(old_token, &issued)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let (access_token, access_expires_utc) = self
            .tokens
            .issue_access_token(identity_id, HashMap::new())?;

        tracing::debug!(identity_id = %identity_id, "Refresh token rotated");
        Ok((
            identity_id,
            TokenSet {
                access_token,
                access_expires_utc,
                refresh: issued,
            },
        ))
    }

    /// Logout: destroy the presented refresh token. A missing row is not
    /// an error - the cookies are cleared either way.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.db.delete_refresh_token(refresh_token).await?;
        Ok(())
    }

    /// Change the caller's password and revoke every refresh token they
    /// hold, atomically.
    pub async fn change_password(
        &self,
        identity_id: Uuid,
        current_password: String,
        new_password: String,
    ) -> Result<(), AuthError> {
        let identity = self
            .db
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        if !identity.can_password_authenticate() {
            return Err(AuthError::InvalidCredentials);
        }

        let hash = identity
            .password_hash
            .clone()
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(
            &Password::new(current_password),
            &PasswordHashString::new(hash),
        )
        .map_err(|_| AuthError::InvalidCredentials)?;

        let new_hash = hash_password(&Password::new(new_password))
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))?;

        self.db
            .change_password(identity_id, new_hash.as_str())
            .await?;

        tracing::info!(identity_id = %identity_id, "Password changed, refresh tokens revoked");
        Ok(())
    }

    /// Create an API token. The secret is returned exactly once; only its
    /// salted hash is persisted.
    pub async fn create_api_token(
        &self,
        identity_id: Uuid,
        label: &str,
    ) -> Result<CreatedApiTokenResponse, AuthError> {
        let secret = self.tokens.generate_api_secret();
        let secret_hash = hash_password(&Password::new(secret.clone()))
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Secret hashing error: {}", e)))?;

        let row = self
            .db
            .insert_api_token(identity_id, label, secret_hash.as_str())
            .await?;

        tracing::info!(identity_id = %identity_id, token_id = row.token_id, "API token created");
        Ok(CreatedApiTokenResponse {
            token_id: row.token_id,
            token_label: row.token_label,
            token: ApiToken::bearer_value(row.token_id, &secret),
        })
    }

    /// Verify an `{id}_{secret}` bearer value and resolve its owner.
    pub async fn verify_api_token(&self, bearer: &str) -> Result<Identity, AuthError> {
        let (token_id, secret) = ApiToken::parse_bearer(bearer).ok_or(AuthError::InvalidToken)?;

        let row = self
            .db
            .find_api_token(token_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        verify_password(
            &Password::new(secret.to_string()),
            &PasswordHashString::new(row.secret_hash.clone()),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        self.db
            .find_identity_by_id(row.identity_id)
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    /// Resolve a verified federated login: link (or create) the identity,
    /// attach pending invites, persist the refresh token - all in one
    /// transaction - and issue the token set.
    pub async fn federated_login(
        &self,
        provider: &str,
        claims: &IdTokenClaims,
    ) -> Result<(Identity, TokenSet), AuthError> {
        let email = claims.email.as_deref().ok_or(AuthError::MissingEmailClaim)?;

        let issued = self.tokens.issue_refresh_token();
        let identity = self
            .db
            .link_federated_login(provider, &claims.sub, email, claims.name.as_deref(), &issued)
            .await?;

        let (access_token, access_expires_utc) = self
            .tokens
            .issue_access_token(identity.identity_id, HashMap::new())?;

        tracing::info!(identity_id = %identity.identity_id, provider = %provider, "Federated login");
        Ok((
            identity,
            TokenSet {
                access_token,
                access_expires_utc,
                refresh: issued,
            },
        ))
    }
}
