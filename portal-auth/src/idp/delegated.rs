//! Delegated identity provider.
//!
//! Any external OIDC provider exposing RFC 7591-style dynamic client
//! registration. The configuration's bootstrap secret is presented as the
//! initial access token.

use async_trait::async_trait;
use serde_json::json;

use crate::idp::{IdentityProvider, ProviderClient, RegistrationResponse};
use crate::models::IdpConfiguration;
use crate::services::AuthError;

pub struct DelegatedProvider {
    registration_endpoint: String,
    initial_access_token: Option<String>,
    http: reqwest::Client,
}

impl DelegatedProvider {
    /// Fails fast when the configuration cannot support both operations.
    pub fn from_config(
        config: &IdpConfiguration,
        http: reqwest::Client,
    ) -> Result<Self, AuthError> {
        let registration_endpoint = config.registration_endpoint.clone().ok_or_else(|| {
            AuthError::ProviderMisconfigured(format!(
                "provider '{}' has no registration endpoint",
                config.provider
            ))
        })?;

        Ok(Self {
            registration_endpoint,
            initial_access_token: config.bootstrap_secret.clone(),
            http,
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.initial_access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl IdentityProvider for DelegatedProvider {
    async fn create_client(
        &self,
        name: &str,
        redirect_uris: &[String],
        scope: Option<&str>,
    ) -> Result<ProviderClient, AuthError> {
        let request = self.http.post(&self.registration_endpoint).json(&json!({
            "client_name": name,
            "redirect_uris": redirect_uris,
            "grant_types": ["authorization_code"],
            "response_types": ["code"],
            "scope": scope.unwrap_or("openid profile email"),
        }));

        let response = self.authorize(request).send().await.map_err(|e| {
            AuthError::Internal(anyhow::anyhow!("Client registration request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, "Delegated provider rejected client registration");
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
        extra: &serde_json::Value,
    ) -> Result<(), AuthError> {
        // RFC 7592 hands back a per-client management URI; fall back to
        // the registration endpoint path convention when absent.
        let url = extra
            .get("registration_client_uri")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                format!(
                    "{}/{}",
                    self.registration_endpoint.trim_end_matches('/'),
                    client_id
                )
            });

        let response = self.authorize(self.http.delete(&url)).send().await.map_err(|e| {
            AuthError::Internal(anyhow::anyhow!("Client deregistration request failed: {}", e))
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        tracing::error!(status = %status, client_id = %client_id, "Delegated provider rejected client deletion");
        Err(AuthError::Internal(anyhow::anyhow!(
            "Client deregistration failed with status {}",
            status
        )))
    }
}
