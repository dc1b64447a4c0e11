//! Identity-provider abstraction.
//!
//! A capability trait over external OAuth2/OIDC providers. Concrete
//! providers are only reachable through [`provider_for`], which selects
//! one at call time from the persisted active configuration - nothing is
//! cached across requests, so the configuration can change at runtime.
//! The trait makes a provider missing an operation a compile error rather
//! than a runtime surprise; a provider missing required configuration
//! fails at construction, before any call is attempted.

pub mod delegated;
pub mod internal;

pub use delegated::DelegatedProvider;
pub use internal::InternalProvider;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::models::{IdpConfiguration, SsoClient};
use crate::services::{AuthError, Database};

/// Credentials returned by a successful client registration.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    pub client_id: String,
    pub client_secret: String,
    pub extra: serde_json::Value,
}

/// Wire shape of an OAuth2 dynamic-registration response.
#[derive(Debug, Deserialize)]
pub(crate) struct RegistrationResponse {
    pub client_id: String,
    pub client_secret: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Operations every identity provider must supply.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register an OAuth2 client with the provider. Must propagate a
    /// provider-side failure - callers depend on receiving real
    /// credentials.
    async fn create_client(
        &self,
        name: &str,
        redirect_uris: &[String],
        scope: Option<&str>,
    ) -> Result<ProviderClient, AuthError>;

    /// Deregister a client. A missing/already-absent client is not an
    /// error; a provider-side failure response is.
    async fn delete_client(
        &self,
        client_id: &str,
        extra: &serde_json::Value,
    ) -> Result<(), AuthError>;
}

/// Select the provider implementation for a persisted configuration.
pub fn provider_for(
    config: &IdpConfiguration,
    http: &reqwest::Client,
) -> Result<Box<dyn IdentityProvider>, AuthError> {
    match config.provider.as_str() {
        "internal" => Ok(Box::new(InternalProvider::from_config(config, http.clone())?)),
        _ => Ok(Box::new(DelegatedProvider::from_config(config, http.clone())?)),
    }
}

/// The client registration for the active provider, created lazily on the
/// first federation use.
pub async fn ensure_sso_client(
    db: &Database,
    config: &IdpConfiguration,
    http: &reqwest::Client,
    redirect_uris: &[String],
) -> Result<SsoClient, AuthError> {
    if let Some(existing) = db.find_sso_client(&config.provider).await? {
        return Ok(existing);
    }

    let provider = provider_for(config, http)?;
    let registered = provider
        .create_client("developer-portal", redirect_uris, Some("openid profile email"))
        .await?;

    let client = SsoClient {
        provider: config.provider.clone(),
        client_id: registered.client_id,
        client_secret: registered.client_secret,
        extra: registered.extra,
        created_utc: Utc::now(),
    };

    db.insert_sso_client(&client).await?;
    tracing::info!(provider = %config.provider, "Registered SSO client with provider");
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(provider: &str, registration_endpoint: Option<&str>) -> IdpConfiguration {
        IdpConfiguration {
            provider: provider.to_string(),
            active: true,
            discovery_url: "https://idp.example.com/.well-known/openid-configuration".into(),
            registration_endpoint: registration_endpoint.map(|s| s.to_string()),
            bootstrap_id: Some("bootstrap".into()),
            bootstrap_secret: Some("secret".into()),
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn test_internal_provider_requires_registration_endpoint() {
        let http = reqwest::Client::new();
        let err = provider_for(&config("internal", None), &http).err();
        assert!(matches!(err, Some(AuthError::ProviderMisconfigured(_))));
    }

    #[test]
    fn test_delegated_provider_requires_registration_endpoint() {
        let http = reqwest::Client::new();
        let err = provider_for(&config("corp-okta", None), &http).err();
        assert!(matches!(err, Some(AuthError::ProviderMisconfigured(_))));
    }

    #[test]
    fn test_well_formed_configs_construct() {
        let http = reqwest::Client::new();
        assert!(provider_for(
            &config("internal", Some("https://idp.example.com/register")),
            &http
        )
        .is_ok());
        assert!(provider_for(
            &config("corp-okta", Some("https://idp.example.com/register")),
            &http
        )
        .is_ok());
    }
}
