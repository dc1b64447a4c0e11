//! OIDC federation client.
//!
//! Implements the provider-facing half of the authorization-code flow:
//! discovery, authorize-URL construction, code exchange, and ID-token
//! verification against the provider's published JWKS. Every outbound call
//! is bounded by the configured timeout; a hung provider surfaces as an
//! exchange/verification failure, never an open request.

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::time::Duration;

use crate::services::error::AuthError;

/// HTTP client for talking to external identity providers.
#[derive(Clone)]
pub struct OidcClient {
    http: reqwest::Client,
}

/// The subset of the provider discovery document this flow needs.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
}

/// Response from the provider token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenExchangeResponse {
    pub id_token: Option<String>,
    #[allow(dead_code)]
    pub access_token: Option<String>,
    #[allow(dead_code)]
    pub token_type: Option<String>,
}

/// Claims extracted from a verified ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[allow(dead_code)]
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<JwksKey>,
}

#[derive(Debug, Deserialize)]
struct JwksKey {
    kty: String,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

impl OidcClient {
    pub fn new(outbound_timeout_secs: u64) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(outbound_timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build OIDC HTTP client: {}", e))?;
        Ok(Self { http })
    }

    /// Fetch the provider discovery document. Cached for the current call
    /// only - callers fetch it fresh so configuration changes take effect
    /// without a restart.
    pub async fn discover(&self, discovery_url: &str) -> Result<DiscoveryDocument, AuthError> {
        let response = self.http.get(discovery_url).send().await.map_err(|e| {
            tracing::warn!(error = %e, "OIDC discovery request failed");
            AuthError::FederationExchangeFailed
        })?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "OIDC discovery returned non-success");
            return Err(AuthError::FederationExchangeFailed);
        }

        response.json::<DiscoveryDocument>().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse OIDC discovery document");
            AuthError::FederationExchangeFailed
        })
    }

    /// Build the authorization redirect URL.
    pub fn build_authorize_url(
        doc: &DiscoveryDocument,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
    ) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            doc.authorization_endpoint,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode("openid profile email"),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code at the provider token endpoint.
    pub async fn exchange_code(
        &self,
        token_endpoint: &str,
        code: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> Result<TokenExchangeResponse, AuthError> {
        let response = self
            .http
            .post(token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "OIDC code exchange request failed");
                AuthError::FederationExchangeFailed
            })?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "OIDC code exchange returned non-success");
            return Err(AuthError::FederationExchangeFailed);
        }

        response.json::<TokenExchangeResponse>().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse OIDC token response");
            AuthError::FederationExchangeFailed
        })
    }

    /// Verify an ID token against the provider's published signing keys:
    /// signature, issuer, and audience (= our client id). Any failure
    /// collapses to `FederationVerificationFailed`.
    pub async fn verify_id_token(
        &self,
        jwks_uri: &str,
        issuer: &str,
        client_id: &str,
        id_token: &str,
    ) -> Result<IdTokenClaims, AuthError> {
        let header = decode_header(id_token).map_err(|e| {
            tracing::warn!(error = %e, "Failed to decode ID token header");
            AuthError::FederationVerificationFailed
        })?;

        let kid = header.kid.ok_or_else(|| {
            tracing::warn!("ID token header has no key id");
            AuthError::FederationVerificationFailed
        })?;

        let jwks = self.fetch_jwks(jwks_uri).await?;
        let key = jwks
            .keys
            .iter()
            .find(|k| k.kid.as_deref() == Some(kid.as_str()) && k.kty == "RSA")
            .ok_or_else(|| {
                tracing::warn!(kid = %kid, "Signing key not found in provider JWKS");
                AuthError::FederationVerificationFailed
            })?;

        let (n, e) = match (&key.n, &key.e) {
            (Some(n), Some(e)) => (n, e),
            _ => {
                tracing::warn!(kid = %kid, "JWKS key is missing RSA components");
                return Err(AuthError::FederationVerificationFailed);
            }
        };

        let decoding_key = DecodingKey::from_rsa_components(n, e).map_err(|e| {
            tracing::warn!(error = %e, "Failed to build decoding key from JWKS");
            AuthError::FederationVerificationFailed
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[client_id]);

        let data = decode::<IdTokenClaims>(id_token, &decoding_key, &validation).map_err(|e| {
            tracing::warn!(error = %e, "ID token verification failed");
            AuthError::FederationVerificationFailed
        })?;

        Ok(data.claims)
    }

    async fn fetch_jwks(&self, jwks_uri: &str) -> Result<JwksDocument, AuthError> {
        let response = self.http.get(jwks_uri).send().await.map_err(|e| {
            tracing::warn!(error = %e, "JWKS request failed");
            AuthError::FederationVerificationFailed
        })?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "JWKS endpoint returned non-success");
            return Err(AuthError::FederationVerificationFailed);
        }

        response.json::<JwksDocument>().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse JWKS document");
            AuthError::FederationVerificationFailed
        })
    }

    /// The underlying HTTP client, shared with provider registration calls.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> DiscoveryDocument {
        DiscoveryDocument {
            issuer: "https://idp.example.com".into(),
            authorization_endpoint: "https://idp.example.com/authorize".into(),
            token_endpoint: "https://idp.example.com/token".into(),
            jwks_uri: "https://idp.example.com/jwks".into(),
        }
    }

    #[test]
    fn test_authorize_url_carries_required_params() {
        let url = OidcClient::build_authorize_url(&doc(), "client-1", "https://portal/cb", "st4te");

        assert!(url.starts_with("https://idp.example.com/authorize?"));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=openid%20profile%20email"));
        assert!(url.contains("state=st4te"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fportal%2Fcb"));
    }

    #[test]
    fn test_authorize_url_encodes_opaque_state() {
        let url = OidcClient::build_authorize_url(&doc(), "c", "https://portal/cb", "a b&c=d");
        assert!(url.contains("state=a%20b%26c%3Dd"));
    }
}
