//! Internal identity provider.
//!
//! The portal's own OAuth2 server. Client registrations go to its
//! registration endpoint authenticated with the bootstrap credentials
//! from the persisted configuration.

use async_trait::async_trait;
use serde_json::json;

use crate::idp::{IdentityProvider, ProviderClient, RegistrationResponse};
use crate::models::IdpConfiguration;
use crate::services::AuthError;

pub struct InternalProvider {
    registration_endpoint: String,
    bootstrap_id: String,
    bootstrap_secret: String,
    http: reqwest::Client,
}

impl InternalProvider {
    /// Fails fast when the configuration cannot support both operations.
    pub fn from_config(
        config: &IdpConfiguration,
        http: reqwest::Client,
    ) -> Result<Self, AuthError> {
        let registration_endpoint = config.registration_endpoint.clone().ok_or_else(|| {
            AuthError::ProviderMisconfigured(
                "internal provider requires a registration endpoint".to_string(),
            )
        })?;
        let bootstrap_id = config.bootstrap_id.clone().ok_or_else(|| {
            AuthError::ProviderMisconfigured(
                "internal provider requires bootstrap credentials".to_string(),
            )
        })?;
        let bootstrap_secret = config.bootstrap_secret.clone().ok_or_else(|| {
            AuthError::ProviderMisconfigured(
                "internal provider requires bootstrap credentials".to_string(),
            )
        })?;

        Ok(Self {
            registration_endpoint,
            bootstrap_id,
            bootstrap_secret,
            http,
        })
    }
}

#[async_trait]
impl IdentityProvider for InternalProvider {
    async fn create_client(
        &self,
        name: &str,
        redirect_uris: &[String],
        scope: Option<&str>,
    ) -> Result<ProviderClient, AuthError> {
        let response = self
            .http
            .post(&self.registration_endpoint)
            .basic_auth(&self.bootstrap_id, Some(&self.bootstrap_secret))
            .json(&json!({
                "client_name": name,
                "redirect_uris": redirect_uris,
                "grant_types": ["authorization_code"],
                "scope": scope.unwrap_or("openid profile email"),
            }))
            .send()
            .await
            .map_err(|e| {
                AuthError::Internal(anyhow::anyhow!("Client registration request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, "Internal provider rejected client registration");
            return Err(AuthError::Internal(anyhow::anyhow!(
                "Client registration failed with status {}",
                status
            )));
        }

        let registered: RegistrationResponse = response.json().await.map_err(|e| {
            AuthError::Internal(anyhow::anyhow!("Malformed registration response: {}", e))
        })?;

        Ok(ProviderClient {
            client_id: registered.client_id,
            client_secret: registered.client_secret,
            extra: serde_json::Value::Object(registered.extra),
        })
    }

    async fn delete_client(
        &self,
        client_id: &str,
        _extra: &serde_json::Value,
    ) -> Result<(), AuthError> {
        let url = format!(
            "{}/{}",
            self.registration_endpoint.trim_end_matches('/'),
            client_id
        );

        let response = self
            .http
            .delete(&url)
            .basic_auth(&self.bootstrap_id, Some(&self.bootstrap_secret))
            .send()
            .await
            .map_err(|e| {
                AuthError::Internal(anyhow::anyhow!("Client deregistration request failed: {}", e))
            })?;

        // An already-absent client is fine; any other failure is not.
        if response.status() == reqwest::StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        tracing::error!(status = %status, client_id = %client_id, "Internal provider rejected client deletion");
        Err(AuthError::Internal(anyhow::anyhow!(
            "Client deregistration failed with status {}",
            status
        )))
    }
}
